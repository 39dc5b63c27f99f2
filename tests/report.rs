use anyhow::Result;
use colprofile::testing::toy_input;
use colprofile::{ProfileConfig, profile_reader, write_jsonl};

#[test]
fn jsonl_report_layout() -> Result<()> {
    let agg = profile_reader(toy_input().as_bytes(), &ProfileConfig::default())?;
    let mut buf = Vec::new();
    write_jsonl(&agg, &mut buf)?;
    let text = String::from_utf8(buf)?;
    let mut lines = text.lines();

    assert_eq!(lines.next(), Some(r#"{"1":1,"2":2}"#));
    let a: serde_json::Value = serde_json::from_str(lines.next().unwrap_or_default())?;
    assert_eq!(a["index"], 0);
    assert_eq!(a["name"], "a");
    assert_eq!(a["max_len"], 6);
    let avg = a["avg_len"].as_f64().unwrap_or_default();
    assert!((avg - 7.0 / 3.0).abs() < 1e-12, "{avg}");
    assert!(lines.next().is_some());
    assert_eq!(lines.next(), None);
    Ok(())
}

#[test]
fn empty_aggregate_reports_null_averages() -> Result<()> {
    let agg = profile_reader("a|b\n".as_bytes(), &ProfileConfig::default())?;
    let mut buf = Vec::new();
    write_jsonl(&agg, &mut buf)?;
    let text = String::from_utf8(buf)?;
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("{}"));
    let col: serde_json::Value = serde_json::from_str(lines.next().unwrap_or_default())?;
    assert!(col["avg_len"].is_null());
    assert!(col["min_len"].is_null());
    Ok(())
}

#[cfg(feature = "io-csv")]
#[test]
fn csv_report_leaves_absent_values_empty() -> Result<()> {
    let agg = profile_reader("a|b\n".as_bytes(), &ProfileConfig::default())?;
    let mut buf = Vec::new();
    colprofile::write_csv_report(&agg, &mut buf)?;
    let text = String::from_utf8(buf)?;
    assert_eq!(
        text,
        "index,name,fill_count,min_len,max_len,avg_len\n0,a,0,,,\n1,b,0,,,\n"
    );
    Ok(())
}

#[cfg(feature = "compression-gzip")]
#[test]
fn report_file_by_extension() -> Result<()> {
    use colprofile::write_report;
    use std::fs;
    use std::io::Read;

    let agg = profile_reader(toy_input().as_bytes(), &ProfileConfig::default())?;
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("reports/profile.jsonl.gz");
    write_report(&agg, &path)?;

    let mut text = String::new();
    colprofile::io::open_input(&path)?.read_to_string(&mut text)?;
    assert_eq!(text.lines().count(), 3);
    assert!(fs::metadata(&path)?.len() > 0);
    Ok(())
}
