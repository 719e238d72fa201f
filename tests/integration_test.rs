//! Integration tests: packet sources through aggregation, datasets and
//! directory runs.

use netmod_pipeline::{
    config::{InputKind, OrderingPolicy, PipelineConfig, SplitStrategy},
    dataset::{window, DatasetBuilder, MinMaxScaler},
    features::{columns, FeatureSeries, FlowGrouper, FlowKey, KeyField, TableOptions},
    packets::{AddressLayer, PacketEvent, PacketRecord, ParsedSource, PortLayer},
    pipeline::{output_stem, Pipeline},
    storage, Recoverable,
};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::AtomicBool;

fn record(ts: f64, len: i64, proto: &str) -> PacketRecord {
    PacketRecord {
        timestamp: Some(ts),
        length: Some(len),
        highest_layer: Some(proto.to_string()),
        ..Default::default()
    }
}

fn udp_record(ts: f64, len: i64, dport: u16) -> PacketRecord {
    PacketRecord {
        udp: Some(PortLayer {
            srcport: Some(40000),
            dstport: Some(dport),
        }),
        ..record(ts, len, "DNS")
    }
}

/// One packet per second for `secs` seconds starting at `start`.
fn steady(start: f64, secs: usize, len: i64) -> Vec<PacketRecord> {
    (0..secs).map(|i| record(start + i as f64, len + i as i64, "TCP")).collect()
}

fn write_jsonl(path: &Path, records: &[PacketRecord]) {
    let mut f = std::fs::File::create(path).unwrap();
    for r in records {
        writeln!(f, "{}", serde_json::to_string(r).unwrap()).unwrap();
    }
}

fn config_for(input: &Path, output: &Path) -> PipelineConfig {
    let mut c = PipelineConfig::default();
    c.input_dir = input.to_path_buf();
    c.output_dir = output.to_path_buf();
    c.sequence.length = 3;
    c
}

#[test]
fn config_load_default() {
    let c = PipelineConfig::load(Path::new("nonexistent.json")).unwrap();
    assert_eq!(c.window.window_secs, 1);
    assert_eq!(c.sequence.target, columns::THROUGHPUT);
    assert_eq!(c.window.ordering, OrderingPolicy::Resort);
    assert!(c.grouping.group_by.is_empty());
}

#[test]
fn config_load_partial_and_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{"window":{"window_secs":2},"grouping":{"group_by":["switch_id","destination_port"]},"sequence":{"split":"time"}}"#,
    )
    .unwrap();
    let c = PipelineConfig::load(&path).unwrap();
    assert_eq!(c.window.window_secs, 2);
    assert_eq!(c.grouping.group_by, vec![KeyField::SwitchId, KeyField::DestinationPort]);
    assert_eq!(c.sequence.split, SplitStrategy::Time);
    assert_eq!(c.sequence.length, 15);

    std::fs::write(&path, r#"{"sequence":{"train_ratio":1.5}}"#).unwrap();
    assert!(PipelineConfig::load(&path).is_err());
    std::fs::write(&path, "not json").unwrap();
    assert!(PipelineConfig::load(&path).is_err());
}

#[test]
fn single_second_burst_yields_one_record() {
    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let records = [10.1, 10.2, 10.3, 10.4, 10.5]
        .iter()
        .map(|t| record(*t, 100, "TCP"))
        .collect();
    let agg = pipeline
        .aggregate(ParsedSource {
            records,
            unparseable: 0,
        })
        .unwrap();
    assert_eq!(agg.series.len(), 1);
    let r = &agg.series[0].records()[0];
    assert_eq!(agg.series[0].len(), 1);
    assert_eq!(r.window_start, 10);
    assert_eq!(r.packet_count, 5);
    assert!((r.throughput - 500.0).abs() < 1e-9);
    assert!((r.avg_packet_size - 100.0).abs() < 1e-9);
    assert!((r.jitter - 0.1).abs() < 1e-9);
}

#[test]
fn distributions_sum_to_one_and_windows_increase() {
    let mut config = PipelineConfig::default();
    config.grouping.group_by = vec![KeyField::DestinationPort];
    let pipeline = Pipeline::new(config).unwrap();

    let mut records = Vec::new();
    for i in 0..200 {
        let ts = 100.0 + i as f64 * 0.137;
        match i % 3 {
            0 => records.push(udp_record(ts, 80 + i, 53)),
            1 => records.push(record(ts, 1500, "HTTP")),
            _ => records.push(record(ts, 60, "ARP")),
        }
    }
    let agg = pipeline
        .aggregate(ParsedSource {
            records,
            unparseable: 0,
        })
        .unwrap();
    assert_eq!(agg.series.len(), 2);
    for s in &agg.series {
        for r in s.records() {
            assert!((r.protocol_distribution.total() - 1.0).abs() < 1e-9);
        }
        for pair in s.records().windows(2) {
            assert!(pair[0].window_start < pair[1].window_start);
        }
    }
    let total: u64 = agg
        .series
        .iter()
        .flat_map(|s| s.records())
        .map(|r| r.packet_count)
        .sum();
    assert_eq!(total, 200);
}

#[test]
fn malformed_records_are_counted_not_fatal() {
    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let mut records = steady(1.0, 3, 100);
    records.push(PacketRecord {
        timestamp: None,
        length: Some(10),
        ..Default::default()
    });
    records.push(PacketRecord {
        timestamp: Some(9.0),
        length: None,
        ..Default::default()
    });
    let agg = pipeline
        .aggregate(ParsedSource {
            records,
            unparseable: 2,
        })
        .unwrap();
    assert_eq!(agg.normalize.seen, 7);
    assert_eq!(agg.normalize.accepted, 3);
    assert_eq!(agg.normalize.malformed_total(), 4);
    assert_eq!(agg.series[0].len(), 3);
}

#[test]
fn drop_policy_reports_out_of_order() {
    let mut config = PipelineConfig::default();
    config.window.ordering = OrderingPolicy::Drop;
    let pipeline = Pipeline::new(config).unwrap();
    let records = vec![record(5.0, 1, "TCP"), record(4.0, 1, "TCP"), record(6.0, 1, "TCP")];
    let agg = pipeline
        .aggregate(ParsedSource {
            records,
            unparseable: 0,
        })
        .unwrap();
    assert_eq!(agg.out_of_order, 1);
    let starts: Vec<i64> = agg.series[0].records().iter().map(|r| r.window_start).collect();
    assert_eq!(starts, vec![5, 6]);
}

#[test]
fn scaler_round_trips_every_column() {
    let mut grouper = FlowGrouper::new(vec![], OrderingPolicy::Resort, 1);
    for i in 0..40 {
        let mut e = PacketEvent::new(i as f64 * 0.7, 50 + (i * 37 % 400) as u64, "TCP");
        e.dest_port = Some(80);
        grouper.route(e).unwrap();
    }
    let out = grouper.finish();
    let series = FeatureSeries::new(FlowKey::unit(), out.groups[&FlowKey::unit()].clone()).unwrap();
    let table = series.to_table(&TableOptions::default()).unwrap();
    let state = MinMaxScaler::fit(&table).unwrap();
    let scaled = state.apply(&table).unwrap();
    for (j, name) in table.columns().iter().enumerate() {
        for i in 0..table.nrows() {
            let s = scaled.values()[[i, j]];
            assert!((0.0..=1.0).contains(&s));
            let back = state.invert(s, name).unwrap();
            assert!((back - table.values()[[i, j]]).abs() < 1e-6 * (1.0 + back.abs()));
        }
    }
}

#[test]
fn constant_packet_sizes_survive_scaling() {
    let mut grouper = FlowGrouper::new(vec![], OrderingPolicy::Resort, 1);
    for i in 0..10 {
        grouper.route(PacketEvent::new(i as f64 + 0.5, 256, "TCP")).unwrap();
    }
    let records = grouper.finish().groups.remove(&FlowKey::unit()).unwrap();
    let series = FeatureSeries::new(FlowKey::unit(), records).unwrap();
    let table = series.to_table(&TableOptions::default()).unwrap();
    let state = MinMaxScaler::fit(&table).unwrap();
    let scaled = state.apply(&table).unwrap();
    let j = table.column_index(columns::AVG_PACKET_SIZE).unwrap();
    assert_eq!(scaled.values()[[3, j]], 0.0);
    assert_eq!(state.invert(0.0, columns::AVG_PACKET_SIZE).unwrap(), 256.0);
    assert!(state
        .degenerate_columns()
        .iter()
        .any(|d| matches!(d, Recoverable::DegenerateColumn { column, .. } if column == columns::AVG_PACKET_SIZE)));
}

#[test]
fn windower_pair_count() {
    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let agg = pipeline
        .aggregate(ParsedSource {
            records: steady(0.0, 12, 100),
            unparseable: 0,
        })
        .unwrap();
    let table = agg.series[0].to_table(&TableOptions::default()).unwrap();
    for length in [1, 3, 11, 12, 20] {
        let set = window(&table, length, columns::THROUGHPUT).unwrap();
        assert_eq!(set.len(), 12usize.saturating_sub(length));
        assert_eq!(set.inputs.dim(), (set.len(), length, table.ncols()));
    }
}

#[test]
fn dataset_fits_on_training_rows_only() {
    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    // throughput keeps rising, so the test tail exceeds the fitted max
    let agg = pipeline
        .aggregate(ParsedSource {
            records: steady(0.0, 40, 100),
            unparseable: 0,
        })
        .unwrap();
    let mut config = PipelineConfig::default().sequence;
    config.length = 5;
    let outcome = DatasetBuilder::new(&config).build(&agg.series[0]).unwrap();
    let d = outcome.dataset.unwrap();
    assert_eq!(d.train.len() + d.test.len(), 35);
    assert_eq!(d.train.len(), 26);
    let (_, max) = d.scaler.bounds(columns::THROUGHPUT).unwrap();
    assert_eq!(max, 100.0 + 30.0);
    assert!(d.test.labels.iter().all(|l| *l > 1.0));
    assert!(d.train.label_windows.last().unwrap() < d.test.label_windows.first().unwrap());

    let predicted = d.scaler.invert_column(&d.test.labels.to_vec(), columns::THROUGHPUT).unwrap();
    assert!((predicted[0] - 131.0).abs() < 1e-9);
}

#[test]
fn time_split_windows_each_side() {
    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let agg = pipeline
        .aggregate(ParsedSource {
            records: steady(0.0, 21, 100),
            unparseable: 0,
        })
        .unwrap();
    let mut config = PipelineConfig::default().sequence;
    config.length = 3;
    config.split = SplitStrategy::Time;
    config.train_ratio = 0.5;
    let d = DatasetBuilder::new(&config)
        .build(&agg.series[0])
        .unwrap()
        .dataset
        .unwrap();
    // rows 0..=10 train, 11..=20 test
    assert_eq!(d.train.len(), 8);
    assert_eq!(d.test.len(), 7);
}

#[test]
fn short_group_is_skipped_and_reported() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let mut records: Vec<PacketRecord> = steady(0.0, 20, 100)
        .into_iter()
        .map(|mut r| {
            r.switch_id = Some("s1".into());
            r
        })
        .collect();
    records.extend(steady(0.5, 3, 100).into_iter().map(|mut r| {
        r.switch_id = Some("s2".into());
        r
    }));
    write_jsonl(&input.path().join("h1.jsonl"), &records);

    let mut config = config_for(input.path(), output.path());
    config.grouping.group_by = vec![KeyField::SwitchId];
    let summary = Pipeline::new(config).unwrap().run_dir(&AtomicBool::new(false)).unwrap();

    assert!(!summary.cancelled);
    let totals = summary.totals();
    assert_eq!(totals.keys, 2);
    assert_eq!(totals.datasets, 1);
    assert_eq!(totals.skipped_keys, 1);
    assert_eq!(summary.sources[0].skipped_keys, vec!["switch_id=s2".to_string()]);
    assert!(output.path().join("root_h1_switch_id-s1_features.csv").exists());
    assert!(output.path().join("root_h1_switch_id-s2_features.csv").exists());
    assert!(output.path().join("root_h1_switch_id-s1_dataset.json").exists());
    assert!(!output.path().join("root_h1_switch_id-s2_dataset.json").exists());
    assert!(output.path().join("run_summary.json").exists());
}

#[test]
fn directory_run_survives_bad_sources() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let sub = input.path().join("exp1").join("h2");
    std::fs::create_dir_all(&sub).unwrap();
    write_jsonl(&sub.join("trace.jsonl"), &steady(0.0, 10, 200));
    std::fs::write(input.path().join("broken.csv"), "Length,Protocol\n10,TCP\n").unwrap();
    std::fs::write(
        input.path().join("flat.csv"),
        "Timestamp,Length,Protocol,Transport,SourcePort,DestinationPort\n\
         1.2,100,DNS,UDP,5353,53\n\
         1.7,x,TCP,,,\n\
         2.1,300,HTTP,TCP,40000,80\n",
    )
    .unwrap();
    std::fs::write(input.path().join("notes.txt"), "ignored").unwrap();

    let summary = Pipeline::new(config_for(input.path(), output.path()))
        .unwrap()
        .run_dir(&AtomicBool::new(false))
        .unwrap();
    let totals = summary.totals();
    assert_eq!(totals.sources, 3);
    assert_eq!(totals.failed_sources, 1);
    let flat = summary
        .sources
        .iter()
        .find(|s| s.path.ends_with("flat.csv"))
        .unwrap();
    assert_eq!(flat.normalize.malformed_total(), 1);
    assert!(flat.malformed_threshold_exceeded);
    assert!(output.path().join("exp1-h2_trace_features.csv").exists());

    let records = storage::read_features_file(&output.path().join("root_flat_features.csv")).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].protocol, "UDP");
    assert_eq!(records[0].dest_port, Some(53));
    assert_eq!(records[1].protocol, "HTTP");
}

#[test]
fn feature_csv_round_trips_exactly() {
    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let mut records = Vec::new();
    for i in 0..30 {
        let ts = i as f64 * 0.31;
        records.push(if i % 4 == 0 {
            udp_record(ts, 70 + i, 53)
        } else {
            let mut r = record(ts, 1000 + i, "TLS");
            r.ip = Some(AddressLayer {
                src: Some("192.168.1.10".into()),
                dst: Some("fe80::1".into()),
            });
            r
        });
    }
    let agg = pipeline
        .aggregate(ParsedSource {
            records,
            unparseable: 0,
        })
        .unwrap();
    let original = agg.series[0].records();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("f.csv");
    storage::write_features_file(&path, original).unwrap();
    let header = std::fs::read_to_string(&path).unwrap();
    assert!(header.starts_with(&storage::FEATURE_HEADER.join(",")));
    let back = storage::read_features_file(&path).unwrap();
    assert_eq!(back, original);
}

#[test]
fn feature_csvs_feed_datasets() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let agg = pipeline
        .aggregate(ParsedSource {
            records: steady(0.0, 12, 100),
            unparseable: 0,
        })
        .unwrap();
    let mut shuffled = agg.series[0].records().to_vec();
    shuffled.reverse();
    storage::write_features_file(&input.path().join("run_features.csv"), &shuffled).unwrap();

    let mut config = config_for(input.path(), output.path());
    config.input_kind = InputKind::Features;
    let summary = Pipeline::new(config).unwrap().run_dir(&AtomicBool::new(false)).unwrap();
    assert_eq!(summary.totals().datasets, 1);
    let text = std::fs::read_to_string(output.path().join("root_run_features_dataset.json")).unwrap();
    let d: netmod_pipeline::Dataset = serde_json::from_str(&text).unwrap();
    assert_eq!(d.sequence_length, 3);
    assert_eq!(d.train.len() + d.test.len(), 9);
}

#[test]
fn stop_flag_cancels_before_first_source() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_jsonl(&input.path().join("a.jsonl"), &steady(0.0, 5, 10));
    let summary = Pipeline::new(config_for(input.path(), output.path()))
        .unwrap()
        .run_dir(&AtomicBool::new(true))
        .unwrap();
    assert!(summary.cancelled);
    assert!(summary.sources.is_empty());
}

#[test]
fn missing_input_dir_is_fatal() {
    let output = tempfile::tempdir().unwrap();
    let config = config_for(Path::new("/nonexistent/netmod/input"), output.path());
    assert!(Pipeline::new(config)
        .unwrap()
        .run_dir(&AtomicBool::new(false))
        .is_err());
}

#[test]
fn output_stem_uses_folder_id() {
    let root = Path::new("/data/in");
    assert_eq!(output_stem(root, Path::new("/data/in/h1.jsonl")), "root_h1");
    assert_eq!(output_stem(root, Path::new("/data/in/a/b/h2.csv")), "a-b_h2");
}

#[test]
fn colliding_key_slugs_get_distinct_files() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let mut records = Vec::new();
    for (switch, len) in [("s1-eth1", 100), ("s1_eth1", 700)] {
        records.extend(steady(0.0, 20, len).into_iter().map(|mut r| {
            r.switch_id = Some(switch.into());
            r
        }));
    }
    write_jsonl(&input.path().join("h1.jsonl"), &records);

    let mut config = config_for(input.path(), output.path());
    config.grouping.group_by = vec![KeyField::SwitchId];
    let summary = Pipeline::new(config).unwrap().run_dir(&AtomicBool::new(false)).unwrap();

    assert_eq!(summary.totals().renamed_outputs, 1);
    // "s1-eth1" sorts first and keeps the plain name
    let first = storage::read_features_file(&output.path().join("root_h1_switch_id-s1_eth1_features.csv")).unwrap();
    let second = storage::read_features_file(&output.path().join("root_h1_switch_id-s1_eth1_2_features.csv")).unwrap();
    assert_eq!(first.len(), 20);
    assert_eq!(second.len(), 20);
    assert!((first[0].avg_packet_size - 100.0).abs() < 1e-9);
    assert!((second[0].avg_packet_size - 700.0).abs() < 1e-9);
    assert!(output.path().join("root_h1_switch_id-s1_eth1_2_dataset.json").exists());
}

#[test]
fn sources_sharing_a_stem_do_not_overwrite() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    std::fs::write(input.path().join("h1.csv"), "Timestamp,Length\n1.5,100\n2.5,100\n").unwrap();
    write_jsonl(&input.path().join("h1.jsonl"), &steady(0.0, 5, 10));

    let summary = Pipeline::new(config_for(input.path(), output.path()))
        .unwrap()
        .run_dir(&AtomicBool::new(false))
        .unwrap();
    assert_eq!(summary.totals().renamed_outputs, 1);
    let csv_side = storage::read_features_file(&output.path().join("root_h1_features.csv")).unwrap();
    let jsonl_side = storage::read_features_file(&output.path().join("root_h1_2_features.csv")).unwrap();
    assert_eq!(csv_side.len(), 2);
    assert_eq!(jsonl_side.len(), 5);
}

#[test]
fn window_secs_scales_throughput_not_buckets() {
    let mut config = PipelineConfig::default();
    config.window.window_secs = 2;
    let pipeline = Pipeline::new(config).unwrap();
    let agg = pipeline
        .aggregate(ParsedSource {
            records: vec![record(10.5, 100, "TCP"), record(11.5, 100, "TCP")],
            unparseable: 0,
        })
        .unwrap();
    let records = agg.series[0].records();
    let starts: Vec<i64> = records.iter().map(|r| r.window_start).collect();
    assert_eq!(starts, vec![10, 11]);
    assert!(records.iter().all(|r| (r.throughput - 50.0).abs() < 1e-9));
}
