use nexusql::config::Config;
use nexusql::storage::Durability;

#[test]
fn explicit_config_file_wins() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nexusql.toml");
    std::fs::write(
        &path,
        "[query]\narray_limit = 10\ndefault_durability = \"soft\"\n\n[logging]\nlevel = \"debug\"\n",
    )
    .unwrap();
    let cfg = Config::resolve(Some(&path)).unwrap();
    assert_eq!(cfg.query.default_durability, Durability::Soft);
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.logging.retention, 7);
}

#[test]
fn unreadable_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Config::resolve(Some(&dir.path().join("nope.toml"))).is_err());
}
