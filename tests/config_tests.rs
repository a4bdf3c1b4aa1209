//! Integration tests for configuration loading and validation.

use camino::Utf8PathBuf;
use cap_std::{ambient_authority, fs_utf8::Dir};
use fleeting_scaleway::config::{MANAGED_BY, MANAGED_BY_LABEL};
use fleeting_scaleway::{ConfigError, FleetConfig};
use rstest::*;
use tempfile::TempDir;

#[fixture]
fn valid_config() -> FleetConfig {
    FleetConfig {
        name: String::from("ci"),
        secret_key: String::from("SCWSECRETKEYEXAMPLE"),
        project_id: String::from("11111111-2222-3333-4444-555555555555"),
        organization_id: None,
        zone: String::from("fr-par-1"),
        server_types: String::from("DEV1-S,DEV1-M"),
        image: String::from("ubuntu_noble"),
        user_data: None,
        user_data_file: None,
        ssh_keys: String::new(),
        private_networks: String::new(),
        labels: String::new(),
        public_ipv4_disabled: false,
        public_ipv6_disabled: false,
        public_ip_pool_enabled: false,
        public_ip_pool_selector: String::new(),
        volume_size: 0,
        generated_password: false,
    }
}

fn temp_root(tmp: &TempDir) -> Dir {
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
        .unwrap_or_else(|path| panic!("temp dir should be utf8: {}", path.display()));
    Dir::open_ambient_dir(&root, ambient_authority())
        .unwrap_or_else(|err| panic!("open temp dir: {err}"))
}

/// Every required field names both its environment variable and TOML key.
#[rstest]
#[case::name(|cfg: &mut FleetConfig| cfg.name.clear(), "FLEET_NAME", "name")]
#[case::secret(|cfg: &mut FleetConfig| cfg.secret_key.clear(), "FLEET_SECRET_KEY", "secret_key")]
#[case::zone(|cfg: &mut FleetConfig| cfg.zone.clear(), "FLEET_ZONE", "zone")]
#[case::types(|cfg: &mut FleetConfig| cfg.server_types = String::from(" , "), "FLEET_SERVER_TYPES", "server_types")]
#[case::image(|cfg: &mut FleetConfig| cfg.image.clear(), "FLEET_IMAGE", "image")]
fn missing_fields_produce_actionable_errors(
    mut valid_config: FleetConfig,
    #[case] mutate: fn(&mut FleetConfig),
    #[case] env_var: &str,
    #[case] toml_key: &str,
) {
    mutate(&mut valid_config);
    let message = valid_config
        .validate()
        .expect_err("validation should fail")
        .to_string();

    assert!(message.contains(env_var), "should mention {env_var}: {message}");
    assert!(message.contains(toml_key), "should mention {toml_key}: {message}");
    assert!(
        message.contains("fleeting-scaleway.toml"),
        "should mention config file: {message}"
    );
}

#[rstest]
fn group_config_adds_managed_by_label(valid_config: FleetConfig) {
    let config = FleetConfig {
        labels: String::from("team=ci"),
        ..valid_config
    };
    let group = config.group_config().expect("valid config");

    assert_eq!(group.server_types, ["DEV1-S", "DEV1-M"]);
    assert_eq!(
        group.labels.get(MANAGED_BY_LABEL).map(String::as_str),
        Some(MANAGED_BY)
    );
    assert_eq!(group.labels.get("team").map(String::as_str), Some("ci"));
}

#[rstest]
fn inline_and_file_user_data_conflict(valid_config: FleetConfig) {
    let config = FleetConfig {
        user_data: Some(String::from("#cloud-config\n")),
        user_data_file: Some(String::from("/tmp/user-data.yml")),
        ..valid_config
    };
    let err = config.validate().expect_err("conflict");
    assert!(
        err.to_string()
            .contains("mutually exclusive configuration provided: user_data, user_data_file"),
        "unexpected error: {err}"
    );
}

#[rstest]
fn user_data_is_read_from_file(valid_config: FleetConfig) {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    temp_root(&tmp)
        .write("user-data.txt", "file-user-data")
        .unwrap_or_else(|err| panic!("write file: {err}"));
    let path = tmp.path().join("user-data.txt");

    let config = FleetConfig {
        user_data_file: Some(path.to_string_lossy().into_owned()),
        ..valid_config
    };
    let group = config.group_config().expect("group config");
    assert_eq!(group.user_data, Some(String::from("file-user-data")));
}

#[rstest]
fn missing_user_data_file_is_reported(valid_config: FleetConfig) {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let missing = tmp.path().join("does-not-exist.txt");
    let missing_str = missing.to_string_lossy().into_owned();

    let config = FleetConfig {
        user_data_file: Some(missing_str.clone()),
        ..valid_config
    };
    let err = config.group_config().expect_err("file is missing");
    let ConfigError::UserData(fleeting_scaleway::UserDataError::FileRead { path, .. }) = err else {
        panic!("expected FileRead error, got {err:?}");
    };
    assert_eq!(path, missing_str);
}

#[rstest]
#[tokio::test]
async fn user_data_path_expands_tilde(valid_config: FleetConfig) {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let home = tmp.path().to_string_lossy().to_string();
    let _guard =
        fleeting_scaleway::test_support::EnvGuard::set_vars(&[("HOME", home.as_str())]).await;

    let fs = temp_root(&tmp);
    fs.create_dir_all("fleet")
        .unwrap_or_else(|err| panic!("create dir: {err}"));
    fs.write("fleet/user-data.txt", "tilde-user-data")
        .unwrap_or_else(|err| panic!("write file: {err}"));

    let config = FleetConfig {
        user_data_file: Some(String::from("~/fleet/user-data.txt")),
        ..valid_config
    };
    let group = config.group_config().expect("group config");
    assert_eq!(group.user_data, Some(String::from("tilde-user-data")));
}

#[tokio::test]
async fn settings_are_read_from_the_environment() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let home = tmp.path().to_string_lossy().to_string();
    let _guard = fleeting_scaleway::test_support::EnvGuard::set_vars(&[
        ("HOME", home.as_str()),
        ("XDG_CONFIG_HOME", home.as_str()),
        ("FLEET_NAME", "env-group"),
        ("FLEET_SECRET_KEY", "secret"),
        ("FLEET_SERVER_TYPES", "DEV1-S"),
        ("FLEET_IMAGE", "ubuntu_noble"),
        ("FLEET_VOLUME_SIZE", "20"),
    ])
    .await;

    let config = FleetConfig::load_without_cli_args().expect("load from env");
    assert_eq!(config.name, "env-group");
    assert_eq!(config.zone, "fr-par-1");
    assert_eq!(config.volume_size, 20);
    assert!(config.validate().is_ok());
}
