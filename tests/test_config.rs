use std::path::PathBuf;
use std::time::Duration;

use gemwire::config::Config;

#[test]
fn test_config_defaults() {
    let cfg = Config::load_with(|_| None).unwrap();
    assert_eq!(cfg.server.listen_addr, "127.0.0.1:1965");
    assert!(cfg.server.hosts.is_empty());
    assert_eq!(cfg.server.max_connections, 0);
    assert_eq!(cfg.connection_timeout(), None);
    assert_eq!(cfg.tls.cert_path, PathBuf::from("cert.pem"));
    assert!(cfg.pages.is_empty());
}

#[test]
fn test_config_listen_from_env() {
    let cfg = Config::load_with(|key| match key {
        "LISTEN" => Some("0.0.0.0:3000".to_string()),
        _ => None,
    })
    .unwrap();
    assert_eq!(cfg.server.listen_addr, "0.0.0.0:3000");
}

#[test]
fn test_config_from_yaml() {
    let cfg = Config::from_yaml(
        r#"
server:
  listen_addr: 0.0.0.0:1965
  hosts: [example.com, "example.org:1966"]
  max_connections: -1
  connection_timeout_secs: 30
tls:
  cert_path: /etc/gemwire/cert.pem
  key_path: /etc/gemwire/key.pem
pages:
  /: pages/index.gmi
  /about: pages/about.gmi
"#,
    )
    .unwrap();

    assert_eq!(cfg.server.listen_addr, "0.0.0.0:1965");
    assert_eq!(cfg.server.hosts, vec!["example.com", "example.org:1966"]);
    assert_eq!(cfg.server.max_connections, -1);
    assert_eq!(cfg.connection_timeout(), Some(Duration::from_secs(30)));
    assert_eq!(cfg.tls.key_path, PathBuf::from("/etc/gemwire/key.pem"));
    assert_eq!(cfg.pages.len(), 2);
    assert_eq!(cfg.pages["/about"], PathBuf::from("pages/about.gmi"));
}

#[test]
fn test_config_partial_yaml_keeps_defaults() {
    let cfg = Config::from_yaml("server:\n  hosts: [example.com]\n").unwrap();
    assert_eq!(cfg.server.listen_addr, "127.0.0.1:1965");
    assert_eq!(cfg.server.hosts, vec!["example.com"]);
    assert_eq!(cfg.tls.key_path, PathBuf::from("key.pem"));
}

#[test]
fn test_config_file_and_env_override() {
    let path = std::env::temp_dir().join(format!("gemwire-test-{}.yaml", std::process::id()));
    std::fs::write(&path, "server:\n  listen_addr: 10.0.0.1:1965\n").unwrap();
    let file = path.to_string_lossy().into_owned();

    let from_file = Config::load_with(|key| match key {
        "GEMWIRE_CONFIG" => Some(file.clone()),
        _ => None,
    })
    .unwrap();
    assert_eq!(from_file.server.listen_addr, "10.0.0.1:1965");

    let overridden = Config::load_with(|key| match key {
        "GEMWIRE_CONFIG" => Some(file.clone()),
        "LISTEN" => Some("127.0.0.1:2000".to_string()),
        _ => None,
    })
    .unwrap();
    assert_eq!(overridden.server.listen_addr, "127.0.0.1:2000");

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_config_missing_explicit_file_is_an_error() {
    let result = Config::load_with(|key| match key {
        "GEMWIRE_CONFIG" => Some("/nonexistent/gemwire.yaml".to_string()),
        _ => None,
    });
    assert!(result.is_err());
}

#[test]
fn test_config_invalid_yaml_is_an_error() {
    assert!(Config::from_yaml("server: [not, a, map]").is_err());
}
