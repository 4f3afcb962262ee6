//! Encryption settings providers

use std::collections::{BTreeMap, HashMap};

use b2sync_core::domain::{EncryptionSetting, FileVersion};
use b2sync_core::ports::IEncryptionSettingsProvider;

/// Leaves every decision to the server
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerDefaultEncryptionSettingsProvider;

impl IEncryptionSettingsProvider for ServerDefaultEncryptionSettingsProvider {
    fn setting_for_upload(
        &self,
        _bucket_name: &str,
        _file_name: &str,
        _file_info: &BTreeMap<String, String>,
        _length: u64,
    ) -> Option<EncryptionSetting> {
        None
    }

    fn source_setting_for_copy(
        &self,
        _bucket_name: &str,
        _source_version: &FileVersion,
    ) -> Option<EncryptionSetting> {
        None
    }

    fn destination_setting_for_copy(
        &self,
        _bucket_name: &str,
        _dest_file_name: &str,
        _source_version: &FileVersion,
    ) -> Option<EncryptionSetting> {
        None
    }

    fn setting_for_download(
        &self,
        _bucket_name: &str,
        _file_version: &FileVersion,
    ) -> Option<EncryptionSetting> {
        None
    }
}

/// One read setting and one write setting per bucket.
///
/// Reads (downloads and copy sources) use the read map; writes (uploads
/// and copy destinations) use the write map. Buckets missing from a map
/// get `None`.
#[derive(Debug, Clone, Default)]
pub struct BasicEncryptionSettingsProvider {
    read_bucket_settings: HashMap<String, EncryptionSetting>,
    write_bucket_settings: HashMap<String, EncryptionSetting>,
}

impl BasicEncryptionSettingsProvider {
    pub fn new(
        read_bucket_settings: HashMap<String, EncryptionSetting>,
        write_bucket_settings: HashMap<String, EncryptionSetting>,
    ) -> Self {
        Self {
            read_bucket_settings,
            write_bucket_settings,
        }
    }

    fn read(&self, bucket_name: &str) -> Option<EncryptionSetting> {
        self.read_bucket_settings.get(bucket_name).cloned()
    }

    fn write(&self, bucket_name: &str) -> Option<EncryptionSetting> {
        self.write_bucket_settings.get(bucket_name).cloned()
    }
}

impl IEncryptionSettingsProvider for BasicEncryptionSettingsProvider {
    fn setting_for_upload(
        &self,
        bucket_name: &str,
        _file_name: &str,
        _file_info: &BTreeMap<String, String>,
        _length: u64,
    ) -> Option<EncryptionSetting> {
        self.write(bucket_name)
    }

    fn source_setting_for_copy(
        &self,
        bucket_name: &str,
        _source_version: &FileVersion,
    ) -> Option<EncryptionSetting> {
        self.read(bucket_name)
    }

    fn destination_setting_for_copy(
        &self,
        bucket_name: &str,
        _dest_file_name: &str,
        _source_version: &FileVersion,
    ) -> Option<EncryptionSetting> {
        self.write(bucket_name)
    }

    fn setting_for_download(
        &self,
        bucket_name: &str,
        _file_version: &FileVersion,
    ) -> Option<EncryptionSetting> {
        self.read(bucket_name)
    }
}
