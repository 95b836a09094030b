#![allow(dead_code)]

use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mixitup_distribution::checksum::sha256_hex;
use mixitup_distribution::error::Result;
use mixitup_distribution::host::{
    HostEnvironment, HostServices, OsDescriptor, ProcessController, RegistryHive, RunningProcess, ShortcutCreator,
    UninstallEntry, UninstallRegistrar,
};
use mixitup_distribution::settings::DistributionSettings;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub fn zip_of(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, body) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Serve `bytes` as the latest `product` package for windows-x64/production.
pub async fn mount_package(server: &MockServer, product: &str, version: &str, bytes: Vec<u8>) {
    let download = format!("/download/{product}-{version}.zip");
    let manifest = serde_json::json!({
        "schemaVersion": 1,
        "product": product,
        "channel": "production",
        "version": version,
        "platforms": [{
            "platform": "windows-x64",
            "files": [{
                "name": format!("{product}-{version}.zip"),
                "url": download,
                "size": bytes.len(),
                "sha256": sha256_hex(&bytes),
                "contentType": "application/zip",
            }],
        }],
    });
    Mock::given(method("GET"))
        .and(path(format!("/apps/{product}/windows-x64/production/latest")))
        .respond_with(ResponseTemplate::new(200).set_body_json(manifest))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(download))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes))
        .mount(server)
        .await;
}

pub fn settings_for(server: &MockServer) -> DistributionSettings {
    DistributionSettings {
        files_base: server.uri(),
        required_policies: Vec::new(),
        ..Default::default()
    }
}

pub struct NothingRunning;

impl ProcessController for NothingRunning {
    fn find(&self, _names: &[String]) -> Vec<RunningProcess> {
        Vec::new()
    }

    fn request_close(&self, _process: &RunningProcess) {}
}

/// Writes a text file naming the target instead of a real shortcut.
pub struct FileShortcuts;

impl ShortcutCreator for FileShortcuts {
    fn create(&self, path: &Path, target: &Path, _working_dir: &Path, _icon: Option<&Path>) -> Result<()> {
        fs::write(path, target.display().to_string()).unwrap();
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingRegistrar {
    pub entries: Arc<Mutex<Vec<(RegistryHive, UninstallEntry)>>>,
}

impl UninstallRegistrar for RecordingRegistrar {
    fn register(&self, hive: RegistryHive, entry: &UninstallEntry) -> Result<()> {
        self.entries.lock().unwrap().push((hive, entry.clone()));
        Ok(())
    }

    fn unregister(&self, hive: RegistryHive) -> Result<()> {
        self.entries.lock().unwrap().retain(|(h, _)| *h != hive);
        Ok(())
    }
}

/// Windows 11 host whose Start Menu and Desktop live under `base`.
pub fn windows_host(base: &Path, registrar: RecordingRegistrar) -> HostServices {
    let start_menu = base.join("Start Menu");
    let desktop = base.join("Desktop");
    fs::create_dir_all(&start_menu).unwrap();
    fs::create_dir_all(&desktop).unwrap();
    HostServices {
        environment: HostEnvironment {
            os: Some(OsDescriptor::windows(10, 0, 22631)),
            is_64bit: true,
            elevated: false,
            start_menu_dir: Some(start_menu),
            desktop_dir: Some(desktop),
            current_exe_dir: None,
            current_exe: None,
        },
        processes: Box::new(NothingRunning),
        shortcuts: Box::new(FileShortcuts),
        registrar: Box::new(registrar),
        process_names: vec!["MixItUp.exe".into()],
        process_tick: Duration::from_millis(1),
    }
}

/// A fake installed version directory with an executable and a data folder.
pub fn install_version(version_root: &Path, version: &str) -> PathBuf {
    let dir = version_root.join(version);
    fs::create_dir_all(dir.join("data")).unwrap();
    fs::write(dir.join("MixItUp.exe"), version).unwrap();
    dir
}
