use std::fs;

use super::*;

#[test]
fn test_defaults() {
    let options = Options::default();
    assert_eq!(options.name, "Kernel");
    assert_eq!(options.language, Language::C);
    assert_eq!(options.grid_policy, GridPolicy::Warn);
    assert_eq!(options.ncollapse, 1);
    assert_eq!(options.chunk_size, 1);
    assert!(!options.halo_exchange);
    assert!(!options.profiling);
}

#[test]
fn test_builders() {
    let options = Options::default()
        .with_name("Forward")
        .with_language(Language::OpenMp)
        .with_grid_policy(GridPolicy::Error)
        .with_ncollapse(2)
        .with_chunk_size(4)
        .with_halo_exchange(true)
        .with_profiling(true);
    assert_eq!(options.name, "Forward");
    assert_eq!(options.language, Language::OpenMp);
    assert_eq!(options.ncollapse, 2);
    assert_eq!(options.chunk_size, 4);
    assert!(options.halo_exchange && options.profiling);
}

#[test]
fn test_full_table() {
    let options = Options::from_toml_str(
        r#"
[lowering]
name = "Forward"
language = "openmp"
grid_policy = "error"
ncollapse = 2
chunk_size = 8
halo_exchange = true
profiling = true
"#,
    )
    .unwrap();
    assert_eq!(
        options,
        Options::default()
            .with_name("Forward")
            .with_language(Language::OpenMp)
            .with_grid_policy(GridPolicy::Error)
            .with_ncollapse(2)
            .with_chunk_size(8)
            .with_halo_exchange(true)
            .with_profiling(true)
    );
}

#[test]
fn test_partial_table_keeps_defaults() {
    let options = Options::from_toml_str("[lowering]\nprofiling = true\n").unwrap();
    assert_eq!(options, Options::default().with_profiling(true));
}

#[test]
fn test_missing_table_is_default() {
    let options = Options::from_toml_str("[other]\nkey = 1\n").unwrap();
    assert_eq!(options, Options::default());
}

#[test]
fn test_unknown_key_rejected() {
    let err = Options::from_toml_str("[lowering]\ncollapse = 2\n").unwrap_err();
    assert!(err.is_error());
    assert!(err.message.contains("invalid lowering config"));
}

#[test]
fn test_unknown_language_rejected() {
    assert!(Options::from_toml_str("[lowering]\nlanguage = \"cuda\"\n").is_err());
}

#[test]
fn test_zero_collapse_rejected() {
    let err = Options::from_toml_str("[lowering]\nncollapse = 0\n").unwrap_err();
    assert!(err.message.contains("ncollapse"));
}

#[test]
fn test_bad_kernel_name_rejected() {
    let err = Options::from_toml_str("[lowering]\nname = \"2fast\"\n").unwrap_err();
    assert!(err.message.contains("2fast"));
}

#[test]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lowering.toml");
    fs::write(&path, "[lowering]\nname = \"Adjoint\"\nhalo_exchange = true\n").unwrap();
    let options = Options::load(&path).unwrap();
    assert_eq!(options.name, "Adjoint");
    assert!(options.halo_exchange);
}

#[test]
fn test_load_invalid_file_notes_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[lowering\n").unwrap();
    let err = Options::load(&path).unwrap_err();
    assert!(err.notes.iter().any(|n| n.contains("broken.toml")));
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = Options::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(err.message.starts_with("cannot read lowering config"));
}
