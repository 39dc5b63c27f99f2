use colprofile::testing::assert_aggregates_equal;
use colprofile::{
    ExecMode, Header, PartialResult, ProfileConfig, Profiler, RowProfiler, StatsSelection,
    collate, split_reader,
};
use proptest::prelude::*;

const WIDTH: usize = 3;

fn row_sets() -> impl Strategy<Value = Vec<Vec<String>>> {
    prop::collection::vec(prop::collection::vec("[a-z]{0,6}", 1..=WIDTH + 1), 0..80)
}

fn profiler() -> RowProfiler {
    RowProfiler::new(
        Header::new((0..WIDTH).map(|c| format!("c{c}")).collect()),
        StatsSelection::all(),
    )
}

fn partial(p: &RowProfiler, rows: &[Vec<String>]) -> PartialResult {
    let mut acc = p.create();
    for r in rows {
        p.add_row(&mut acc, r);
    }
    acc
}

fn lines(rows: &[Vec<String>]) -> Vec<anyhow::Result<String>> {
    rows.iter().map(|r| Ok(r.join("|"))).collect()
}

proptest! {
    #[test]
    fn merge_is_associative_and_commutative(rows in row_sets(), cut1 in 0usize..80, cut2 in 0usize..80) {
        let p = profiler();
        let (lo, hi) = (cut1.min(cut2).min(rows.len()), cut1.max(cut2).min(rows.len()));
        let (a, b, c) = (&rows[..lo], &rows[lo..hi], &rows[hi..]);

        // (a + b) + c
        let mut left = partial(&p, a);
        p.merge(&mut left, partial(&p, b));
        p.merge(&mut left, partial(&p, c));

        // c + (b + a)
        let mut inner = partial(&p, b);
        p.merge(&mut inner, partial(&p, a));
        let mut right = partial(&p, c);
        p.merge(&mut right, inner);

        prop_assert_eq!(&left, &right);
        prop_assert_eq!(left, partial(&p, &rows));
    }

    #[test]
    fn any_partitioning_collates_to_the_single_pass_result(rows in row_sets(), parts in 1usize..6) {
        let p = profiler();
        let chunk = rows.len().div_ceil(parts).max(1);
        let partials: Vec<_> = rows.chunks(chunk).map(|c| partial(&p, c)).collect();
        let expected = p.finish(partial(&p, &rows));
        assert_aggregates_equal(&collate(&p, partials), &expected);
    }

    #[test]
    fn worker_count_and_batch_size_are_invisible(
        rows in row_sets(),
        workers in 1usize..6,
        batch in 1usize..12,
    ) {
        let cfg = ProfileConfig::default().with_batch_size(batch);
        let header = profiler().header().clone();
        let seq = Profiler::new(cfg.clone())
            .with_mode(ExecMode::Sequential)
            .profile_lines(header.clone(), lines(&rows))?;
        let par = Profiler::new(cfg)
            .with_mode(ExecMode::Parallel { workers: Some(workers) })
            .profile_lines(header, lines(&rows))?;
        assert_aggregates_equal(&par, &seq);
    }

    #[test]
    fn histogram_counts_every_row(rows in row_sets(), batch in 1usize..12) {
        let cfg = ProfileConfig::default().with_batch_size(batch).with_workers(3);
        let header = profiler().header().clone();
        let out = Profiler::new(cfg.clone()).profile_lines(header, lines(&rows))?;
        prop_assert_eq!(out.histogram.total_rows(), rows.len() as u64);
        let matching = rows.iter().filter(|r| r.len() == WIDTH).count() as u64;
        prop_assert_eq!(out.matching_rows(), matching);

        let mut input = (0..WIDTH).map(|c| format!("c{c}")).collect::<Vec<_>>().join("|");
        input.push('\n');
        for r in &rows {
            input.push_str(&r.join("|"));
            input.push('\n');
        }
        let split = split_reader(input.as_bytes(), &cfg, |_, _| Ok(Vec::<u8>::new()))?;
        prop_assert_eq!(&split.histogram, &out.histogram);
        prop_assert!(split.values_written.iter().all(|&n| n == matching));
    }
}
