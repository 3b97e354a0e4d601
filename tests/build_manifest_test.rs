use anyhow::Result;

fn dockerfile() -> Result<String> {
    Ok(std::fs::read_to_string(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("Dockerfile"),
    )?)
}

/// 依賴層只依賴 Cargo.toml 與 Cargo.lock，且以鎖定版本建置
#[test]
fn test_dependency_layer_is_locked() -> Result<()> {
    let content = dockerfile()?;
    let lines: Vec<&str> = content.lines().map(str::trim).collect();

    let manifest_copy = lines
        .iter()
        .position(|l| l.starts_with("COPY Cargo.toml"))
        .expect("manifest copy");
    let source_copy = lines
        .iter()
        .position(|l| l.starts_with("COPY src"))
        .expect("source copy");

    assert_eq!(lines[manifest_copy], "COPY Cargo.toml Cargo.lock ./");
    assert!(manifest_copy < source_copy);

    let builds: Vec<&&str> = lines.iter().filter(|l| l.contains("cargo build")).collect();
    assert_eq!(builds.len(), 2);
    assert!(builds.iter().all(|l| l.contains("--locked")));
    Ok(())
}

#[test]
fn test_image_launches_on_fixed_address() -> Result<()> {
    let content = dockerfile()?;
    assert!(content.contains("COPY app.log ./"));
    assert!(content.contains("EXPOSE 8000"));
    assert!(content.contains(
        r#"CMD ["demo-service", "main:app", "--host", "0.0.0.0", "--port", "8000"]"#
    ));
    Ok(())
}
