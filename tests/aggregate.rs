use anyhow::Result;
use colprofile::testing::{assert_aggregates_equal, generate_input, toy_input};
use colprofile::{
    AverageBasis, CancelToken, ChannelQueue, ColumnWorker, DelimitedTokenizer, ExecMode, Header,
    ProfileConfig, ProfileError, Profiler, RowProfiler, StatsSelection, WorkQueue, profile_reader,
};

fn close(a: Option<f64>, b: f64) -> bool {
    a.is_some_and(|a| (a - b).abs() < 1e-12)
}

#[test]
fn toy_input_figures() -> Result<()> {
    let out = profile_reader(toy_input().as_bytes(), &ProfileConfig::default().with_workers(3))?;

    assert_eq!(out.header.names(), ["a", "b"]);
    assert_eq!(out.histogram.iter().collect::<Vec<_>>(), vec![(1, 1), (2, 2)]);
    assert_eq!(out.matching_rows(), 2);
    assert_eq!(out.malformed_rows(), 1);

    let a = &out.columns[0];
    assert_eq!((a.fill_count, a.min_len, a.max_len), (Some(2), Some(1), Some(6)));
    assert!(close(a.avg_len, 7.0 / 3.0));

    let b = &out.columns[1];
    assert_eq!((b.fill_count, b.min_len, b.max_len), (Some(1), Some(0), Some(3)));
    assert!(close(b.avg_len, 1.0));
    Ok(())
}

#[test]
fn matching_rows_basis_divides_by_well_formed_rows() -> Result<()> {
    let cfg = ProfileConfig::default().with_average_basis(AverageBasis::MatchingRows);
    let out = profile_reader(toy_input().as_bytes(), &cfg)?;
    assert!(close(out.columns[0].avg_len, 3.5));
    assert!(close(out.columns[1].avg_len, 1.5));
    Ok(())
}

#[test]
fn header_only_input_has_no_figures() -> Result<()> {
    let out = profile_reader("a|b\n".as_bytes(), &ProfileConfig::default())?;
    assert!(out.histogram.is_empty());
    assert!(out.is_empty());
    for c in &out.columns {
        assert_eq!(c.fill_count, Some(0));
        assert_eq!((c.min_len, c.max_len, c.avg_len), (None, None, None));
    }
    Ok(())
}

#[test]
fn all_malformed_rows_leave_columns_untouched() -> Result<()> {
    for basis in [AverageBasis::AllRows, AverageBasis::MatchingRows] {
        let cfg = ProfileConfig::default().with_average_basis(basis);
        let out = profile_reader("a|b\nx\ny|z|w\n".as_bytes(), &cfg)?;
        assert_eq!(out.histogram.iter().collect::<Vec<_>>(), vec![(1, 1), (3, 1)]);
        assert!(out.is_empty());
        for c in &out.columns {
            assert_eq!(c.avg_len, None, "{basis:?}");
            assert_eq!(c.min_len, None, "{basis:?}");
        }
    }
    Ok(())
}

#[test]
fn empty_stream_is_rejected() {
    let err = profile_reader("".as_bytes(), &ProfileConfig::default()).unwrap_err();
    assert!(matches!(err, ProfileError::EmptyInput));
}

#[test]
fn worker_count_does_not_change_the_result() -> Result<()> {
    let input = generate_input(2_000, 5, Some(11));
    let cfg = ProfileConfig::default().with_batch_size(37);
    let expected = Profiler::new(cfg.clone())
        .with_mode(ExecMode::Sequential)
        .profile_reader(input.as_bytes())?;
    assert_eq!(expected.histogram.total_rows(), 2_000);

    for workers in [1, 2, 3, 8] {
        let got = Profiler::new(cfg.clone())
            .with_mode(ExecMode::Parallel { workers: Some(workers) })
            .profile_reader(input.as_bytes())?;
        assert_aggregates_equal(&got, &expected);
    }
    Ok(())
}

#[test]
fn bounded_queue_gives_the_same_result() -> Result<()> {
    let input = generate_input(500, 3, Some(4));
    let unbounded = profile_reader(input.as_bytes(), &ProfileConfig::default().with_batch_size(8))?;
    let bounded = profile_reader(
        input.as_bytes(),
        &ProfileConfig::default().with_batch_size(8).with_queue_capacity(2).with_workers(4),
    )?;
    assert_aggregates_equal(&bounded, &unbounded);
    Ok(())
}

#[test]
fn fill_only_selection_reports_no_lengths() -> Result<()> {
    let cfg = ProfileConfig::default().with_stats(StatsSelection::fill_only());
    let out = profile_reader(toy_input().as_bytes(), &cfg)?;
    assert_eq!(out.columns[0].fill_count, Some(2));
    assert_eq!(out.columns[1].fill_count, Some(1));
    assert!(out.columns.iter().all(|c| c.max_len.is_none() && c.avg_len.is_none()));
    Ok(())
}

#[test]
fn custom_delimiter() -> Result<()> {
    let cfg = ProfileConfig::default().with_delimiter(',');
    let out = profile_reader("x,y\nab,c\n".as_bytes(), &cfg)?;
    assert_eq!(out.matching_rows(), 1);
    assert_eq!(out.columns[0].max_len, Some(2));
    Ok(())
}

#[test]
fn cancelled_before_start() {
    let token = CancelToken::new();
    token.cancel();
    for mode in [ExecMode::Sequential, ExecMode::Parallel { workers: Some(2) }] {
        let err = Profiler::new(ProfileConfig::default())
            .with_mode(mode)
            .with_cancel(token.clone())
            .profile_reader(toy_input().as_bytes())
            .unwrap_err();
        assert!(matches!(err, ProfileError::Cancelled), "{mode:?}: {err}");
    }
}

#[test]
fn cancelled_mid_stream() {
    let token = CancelToken::new();
    let trigger = token.clone();
    let lines = (0..10_000u32).map(move |i| {
        if i == 100 {
            trigger.cancel();
        }
        Ok::<_, anyhow::Error>(format!("{i}|v"))
    });
    let err = Profiler::new(ProfileConfig::default().with_batch_size(10).with_workers(2))
        .with_cancel(token)
        .profile_lines(Header::new(vec!["n".into(), "v".into()]), lines)
        .unwrap_err();
    assert!(matches!(err, ProfileError::Cancelled), "{err}");
}

#[test]
fn read_error_aborts_the_run() {
    let lines = vec![Ok("1|2".to_string()), Err(anyhow::anyhow!("disk gone"))];
    let err = Profiler::new(ProfileConfig::default())
        .profile_lines(Header::new(vec!["a".into(), "b".into()]), lines)
        .unwrap_err();
    assert!(matches!(err, ProfileError::Io(_)), "{err}");
    assert!(err.to_string().contains("disk gone"));
}

#[test]
fn closed_queue_without_end_marker_is_a_protocol_violation() -> Result<()> {
    let profiler = RowProfiler::new(Header::new(vec!["a".into()]), StatsSelection::all());
    let tokenizer = DelimitedTokenizer::default();
    let queue = ChannelQueue::new("lines", None, CancelToken::new());
    queue.push(vec!["x".to_string()])?;
    queue.close();

    let err = ColumnWorker::new(&profiler, &tokenizer).run(&queue).unwrap_err();
    assert!(err.is_protocol_violation(), "{err}");
    Ok(())
}

#[cfg(all(feature = "compression-gzip", feature = "compression-zstd"))]
#[test]
fn profiles_a_compressed_file() -> Result<()> {
    use colprofile::io::compression::FinishWrite;
    use std::io::Write;

    let dir = tempfile::tempdir()?;
    let mut expected = None;
    for name in ["input.txt", "input.txt.gz", "input.txt.zst"] {
        let path = dir.path().join(name);
        {
            let mut w = colprofile::io::create_output(&path)?;
            w.write_all(toy_input().as_bytes())?;
            w.finish()?;
        }
        let out = Profiler::new(ProfileConfig::default()).profile_path(&path)?;
        if let Some(e) = &expected {
            assert_aggregates_equal(&out, e);
        } else {
            expected = Some(out);
        }
    }
    assert_eq!(expected.map(|e| e.matching_rows()), Some(2));
    Ok(())
}

#[test]
fn config_loaded_from_json_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("profile.json");
    std::fs::write(&path, r#"{"delimiter": ";", "batch_size": 2, "average_basis": "matching_rows"}"#)?;
    let cfg = ProfileConfig::from_json_file(&path)?;
    let out = profile_reader("a;b\n1;2\n3\n".as_bytes(), &cfg)?;
    assert!(close(out.columns[0].avg_len, 1.0));
    Ok(())
}
