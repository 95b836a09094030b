mod common;

use std::fs;
use std::path::Path;

use filetime::{FileTime, set_file_mtime};
use mixitup_distribution::config::LauncherConfigService;
use mixitup_distribution::events::{self, LauncherEvent};
use mixitup_distribution::launcher::Launcher;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{install_version, mount_package, settings_for, zip_of};

const PRIOR: [&str; 4] = ["1.0.0", "1.1.0", "1.2.0", "1.3.0"];

/// Four installed versions, oldest first by mtime, with 1.3.0 current.
fn seed_root(root: &Path) {
    let version_root = root.join("app");
    for (i, version) in PRIOR.iter().enumerate() {
        let dir = install_version(&version_root, version);
        set_file_mtime(&dir, FileTime::from_unix_time(1_600_000_000 + i as i64 * 1000, 0)).unwrap();
    }
    fs::write(
        version_root.join("1.3.0").join("data").join("ApplicationSettings.json"),
        "settings",
    )
    .unwrap();
    fs::write(
        root.join("launcher.json"),
        r#"{"currentVersion":"1.3.0","versions":["1.0.0","1.1.0","1.2.0","1.3.0"],"retentionCount":3}"#,
    )
    .unwrap();
}

fn dir_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn update_prunes_to_retention_count() {
    let server = MockServer::start().await;
    mount_package(&server, "mixitup-desktop", "2.0.0", zip_of(&[("MixItUp.exe", "2.0.0")])).await;
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("MixItUp");
    seed_root(&root);

    let mut launcher = Launcher::new(root.clone(), settings_for(&server));
    launcher.initialize().await.unwrap();
    assert_eq!(launcher.available_update().map(|u| u.version.as_str()), Some("2.0.0"));

    let installed = launcher.install_update().await.unwrap();
    assert_eq!(installed.as_deref(), Some("2.0.0"));

    assert_eq!(dir_names(&root.join("app")), vec!["1.2.0", "1.3.0", "2.0.0"]);
    assert!(dir_names(&root).iter().all(|name| !name.contains(".backup-")));
    assert!(!root.join(".tmp").exists());

    let config = LauncherConfigService::load(&root.join("launcher.json")).unwrap().unwrap();
    assert_eq!(config.current_version(), Some("2.0.0"));
    assert_eq!(config.versions, vec!["1.2.0", "1.3.0", "2.0.0"]);
    assert_eq!(config.retention_count, Some(3));

    let data = root.join("app").join("2.0.0").join("data");
    assert_eq!(fs::read_to_string(data.join("ApplicationSettings.json")).unwrap(), "settings");
    assert!(launcher.can_launch());
    assert_eq!(
        launcher.executable_path().unwrap(),
        root.join("app").join("2.0.0").join("MixItUp.exe")
    );
}

#[test]
fn failed_config_write_restores_pruned_versions() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("MixItUp");
    seed_root(&root);
    let config_before = fs::read_to_string(root.join("launcher.json")).unwrap();
    // A directory where the pending config file should go makes the config write fail
    // after the version swap and pruning have happened.
    fs::create_dir_all(root.join(".tmp").join("launcher.json.pending").join("blocker")).unwrap();

    let (sink, mut rx) = events::channel();
    let mut launcher = Launcher::new(root.clone(), Default::default()).with_events(sink);
    launcher.load_config().unwrap();
    assert!(launcher.apply_update("2.0.0", &zip_of(&[("MixItUp.exe", "2.0.0")])).is_err());

    assert_eq!(dir_names(&root.join("app")), PRIOR.to_vec());
    assert_eq!(fs::read_to_string(root.join("launcher.json")).unwrap(), config_before);
    assert!(dir_names(&root).iter().all(|name| !name.contains(".backup-")));
    assert!(!root.join(".tmp").exists());
    assert_eq!(launcher.config().current_version(), Some("1.3.0"));

    let mut failure = None;
    while let Ok(event) = rx.try_recv() {
        if let LauncherEvent::Failed { message, .. } = event {
            failure = Some(message);
        }
    }
    assert!(failure.unwrap().ends_with("Previous version restored."));
}

#[test]
fn update_with_unsafe_version_name_is_refused() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("MixItUp");
    seed_root(&root);

    let mut launcher = Launcher::new(root.clone(), Default::default());
    launcher.load_config().unwrap();
    assert!(launcher.apply_update("../..", &zip_of(&[("MixItUp.exe", "x")])).is_err());

    assert_eq!(dir_names(&root.join("app")), PRIOR.to_vec());
    assert!(!tmp.path().join("MixItUp.exe").exists());
    assert_eq!(launcher.config().current_version(), Some("1.3.0"));
}

#[tokio::test]
async fn offline_start_uses_installed_version() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("MixItUp");
    seed_root(&root);

    let mut launcher = Launcher::new(root.clone(), settings_for(&server));
    launcher.initialize().await.unwrap();

    assert!(launcher.available_update().is_none());
    assert!(launcher.can_launch());
}

#[tokio::test]
async fn nothing_installed_and_offline_fails() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();

    let mut launcher = Launcher::new(tmp.path().join("MixItUp"), settings_for(&server));
    assert!(launcher.initialize().await.is_err());
    assert!(!launcher.can_launch());
}

#[tokio::test]
async fn outdated_policy_blocks_launch_until_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/policies/eula/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "schemaVersion": 1,
            "policy": "eula",
            "version": "2",
            "title": "End User License Agreement",
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/policies/eula/version/2/content"))
        .respond_with(ResponseTemplate::new(200).set_body_string("# EULA"))
        .mount(&server)
        .await;
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("MixItUp");
    seed_root(&root);
    fs::write(
        root.join("launcher.json"),
        r#"{"currentVersion":"1.3.0","versions":["1.3.0"],"acceptedPolicies":{"eula":{"version":"1","acceptedAtUtc":"2024-01-01T00:00:00Z"}}}"#,
    )
    .unwrap();

    let mut settings = settings_for(&server);
    settings.required_policies = vec!["eula".into()];
    let mut launcher = Launcher::new(root.clone(), settings);
    launcher.initialize().await.unwrap();

    assert!(!launcher.can_launch());
    assert_eq!(launcher.policies()[0].markdown, "# EULA");

    launcher.accept_policies().unwrap();
    assert!(launcher.can_launch());
    let config = LauncherConfigService::load(&root.join("launcher.json")).unwrap().unwrap();
    assert_eq!(config.accepted_policy_version("eula"), Some("2"));
}
