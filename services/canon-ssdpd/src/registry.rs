//! Registry of configured devices.
//!
//! Built once at startup from a key file where each section names a device
//! by its SSDP USN:
//!
//! ```ini
//! [uuid:00000000-0000-0000-0001-60128B7C1234::upnp:rootdevice]
//! path=/srv/camera
//! command=gphoto2 --port ptpip:$HOSTNAME --get-all-files --skip-existing
//! ```
//!
//! Only the per-device busy flag changes after construction.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ini::{Ini, ParseOption};
use tracing::{debug, warn};

use crate::error::RegistryError;

/// Key holding the action's working directory.
pub const PATH_KEY: &str = "path";

/// Key holding the action's command line.
pub const COMMAND_KEY: &str = "command";

/// A configured device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: String,
    pub working_directory: PathBuf,
    pub command_template: String,
    busy: bool,
}

impl Device {
    pub fn new(
        id: impl Into<String>,
        working_directory: impl Into<PathBuf>,
        command_template: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            working_directory: working_directory.into(),
            command_template: command_template.into(),
            busy: false,
        }
    }

    /// True while an action for this device is running.
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub(crate) fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }
}

/// Devices keyed by id.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, Device>,
}

impl DeviceRegistry {
    /// Load the registry from a key file on disk.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let text = std::fs::read_to_string(path).map_err(|source| RegistryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini_str(&text)
    }

    /// Build the registry from key-file text.
    ///
    /// Sections lacking `path` or `command` are skipped. When a device id
    /// appears in several complete sections, the last one wins.
    pub fn from_ini_str(text: &str) -> Result<Self, RegistryError> {
        // Values are kept verbatim: shell quoting and backslashes belong to
        // the command tokenizer, not the file format.
        let options = ParseOption {
            enabled_quote: false,
            enabled_escape: false,
            ..Default::default()
        };
        let ini = Ini::load_from_str_opt(text, options)?;

        let mut registry = Self::default();
        for (section, properties) in ini.iter() {
            let Some(id) = section else {
                continue;
            };

            let path = properties.get_all(PATH_KEY).last();
            let command = properties.get_all(COMMAND_KEY).last();
            match (path, command) {
                (Some(path), Some(command)) => {
                    registry.insert(Device::new(id, path, command));
                }
                _ => {
                    warn!(
                        device_id = %id,
                        has_path = path.is_some(),
                        has_command = command.is_some(),
                        "Skipping incomplete device section"
                    );
                }
            }
        }

        Ok(registry)
    }

    /// Add a device, replacing any previous device with the same id.
    pub fn insert(&mut self, device: Device) {
        let id = device.id.clone();
        if self.devices.insert(id.clone(), device).is_some() {
            warn!(device_id = %id, "Duplicate device section, later entry wins");
        } else {
            debug!(device_id = %id, "Device registered");
        }
    }

    pub fn lookup(&self, id: &str) -> Option<&Device> {
        self.devices.get(id)
    }

    pub fn lookup_mut(&mut self, id: &str) -> Option<&mut Device> {
        self.devices.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }
}

impl FromIterator<Device> for DeviceRegistry {
    fn from_iter<I: IntoIterator<Item = Device>>(iter: I) -> Self {
        let mut registry = Self::default();
        for device in iter {
            registry.insert(device);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_complete_sections_become_devices() {
        let registry = DeviceRegistry::from_ini_str(
            "[uuid:cam-1::upnp:rootdevice]\n\
             path=/srv/cam1\n\
             command=capture --host=$HOSTNAME\n\
             \n\
             [uuid:cam-2]\n\
             path=/srv/cam2\n\
             command=echo $HOSTNAME\n",
        )
        .unwrap();

        assert_eq!(registry.len(), 2);
        let cam1 = registry.lookup("uuid:cam-1::upnp:rootdevice").unwrap();
        assert_eq!(cam1.working_directory, PathBuf::from("/srv/cam1"));
        assert_eq!(cam1.command_template, "capture --host=$HOSTNAME");
        assert!(!cam1.is_busy());
        assert!(registry.lookup("uuid:cam-2").is_some());
    }

    #[test]
    fn test_incomplete_sections_are_skipped() {
        let registry = DeviceRegistry::from_ini_str(
            "[no-command]\n\
             path=/srv/a\n\
             [no-path]\n\
             command=true\n\
             [empty]\n\
             [complete]\n\
             path=/srv/b\n\
             command=true\n",
        )
        .unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.lookup("complete").is_some());
        assert!(registry.lookup("no-command").is_none());
        assert!(registry.lookup("no-path").is_none());
        assert!(registry.lookup("empty").is_none());
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let registry = DeviceRegistry::from_ini_str(
            "[cam]\npath=/srv/cam\ncommand=true\nmodel=EOS R6\n",
        )
        .unwrap();

        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_complete_section_last_wins() {
        let registry = DeviceRegistry::from_ini_str(
            "[cam]\npath=/first\ncommand=one\n\
             [cam]\npath=/second\ncommand=two\n",
        )
        .unwrap();

        assert_eq!(registry.len(), 1);
        let cam = registry.lookup("cam").unwrap();
        assert_eq!(cam.working_directory, PathBuf::from("/second"));
        assert_eq!(cam.command_template, "two");
    }

    #[test]
    fn test_incomplete_duplicate_keeps_earlier_device() {
        let registry = DeviceRegistry::from_ini_str(
            "[cam]\npath=/first\ncommand=one\n\
             [cam]\npath=/second\n",
        )
        .unwrap();

        assert_eq!(registry.lookup("cam").unwrap().command_template, "one");
    }

    #[test]
    fn test_command_quoting_is_preserved() {
        let registry = DeviceRegistry::from_ini_str(
            "[cam]\npath=/srv/cam\ncommand=capture \"--name=a b\" 'c d' e\\ f\n",
        )
        .unwrap();

        assert_eq!(
            registry.lookup("cam").unwrap().command_template,
            "capture \"--name=a b\" 'c d' e\\ f"
        );
    }

    #[test]
    fn test_backslashes_are_left_to_the_tokenizer() {
        let registry =
            DeviceRegistry::from_ini_str("[cam]\npath=/srv/cam\ncommand=echo a\\\\b c\\sd\n").unwrap();

        let command = &registry.lookup("cam").unwrap().command_template;
        assert_eq!(command, "echo a\\\\b c\\sd");
        assert_eq!(
            crate::template::tokenize(command).unwrap(),
            vec!["echo".to_string(), "a\\b".to_string(), "csd".to_string()]
        );
    }

    #[test]
    fn test_comments_are_ignored() {
        let registry = DeviceRegistry::from_ini_str(
            "# cameras\n; more\n[cam]\n# disabled=1\npath=/srv/cam\ncommand=true\n",
        )
        .unwrap();

        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_unknown_is_none() {
        let registry = DeviceRegistry::from_ini_str("[cam]\npath=/a\ncommand=b\n").unwrap();
        assert!(registry.lookup("other").is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[cam]\npath=/srv/cam\ncommand=true").unwrap();

        let registry = DeviceRegistry::load(file.path()).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = DeviceRegistry::load(&dir.path().join("absent.conf")).unwrap_err();
        assert_eq!(err.reason_code(), "config_read_failed");
    }

    #[test]
    fn test_load_unparsable_file_fails() {
        let err = DeviceRegistry::from_ini_str("[unterminated\npath=/a\n").unwrap_err();
        assert_eq!(err.reason_code(), "config_parse_failed");
    }
}
