use std::fs;
use std::io::Write;

use camino::Utf8PathBuf;
use flate2::Compression;
use flate2::write::GzEncoder;

use genebase::dedup::{Deduplicator, sequence_hash};

fn scratch_dir() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

fn report_rows(path: &Utf8PathBuf) -> Vec<(String, String, u64)> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| {
            let cols: Vec<&str> = line.split('\t').collect();
            assert_eq!(cols.len(), 3);
            (cols[0].to_string(), cols[1].to_string(), cols[2].parse().unwrap())
        })
        .collect()
}

const COMBINED: &str = "\
>sp|P1|ONE first OS=Alpha OX=1
MKT
VLA
>tr|Q1|TWO second OS=Beta OX=2
mktvla
>tr|Q2|THREE third OS=Gamma OX=3
GGGSSS
>tr|Q3|FOUR fourth OS=Delta OX=4
MKTVLA
";

#[test]
fn retains_first_header_and_reports_counts() {
    let (_temp, root) = scratch_dir();
    let input = root.join("combined.fasta");
    fs::write(&input, COMBINED).unwrap();
    let retained = root.join("dedup.fasta");
    let report = root.join("dedup_report.tsv");

    let summary = Deduplicator::default().run(&input, &retained, &report).unwrap();
    assert_eq!(summary.total_records, 4);
    assert_eq!(summary.unique_records, 2);
    assert_eq!(summary.duplicate_records, 2);

    let text = fs::read_to_string(&retained).unwrap();
    assert_eq!(
        text,
        ">sp|P1|ONE first OS=Alpha OX=1\nMKTVLA\n>tr|Q2|THREE third OS=Gamma OX=3\nGGGSSS\n"
    );

    let rows = report_rows(&report);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].0, sequence_hash("MKTVLA"));
    assert_eq!(rows[0].1, "sp|P1|ONE first OS=Alpha OX=1");
    assert_eq!(rows[0].2, 3);
    assert_eq!(rows.iter().map(|row| row.2).sum::<u64>(), 4);
}

#[test]
fn second_pass_is_idempotent() {
    let (_temp, root) = scratch_dir();
    let input = root.join("combined.fasta");
    fs::write(&input, COMBINED).unwrap();
    let first = root.join("first.fasta");
    let second = root.join("second.fasta");

    Deduplicator::default()
        .run(&input, &first, &root.join("first.tsv"))
        .unwrap();
    let summary = Deduplicator::default()
        .run(&first, &second, &root.join("second.tsv"))
        .unwrap();

    assert_eq!(summary.duplicate_records, 0);
    assert_eq!(fs::read_to_string(&first).unwrap(), fs::read_to_string(&second).unwrap());
    assert!(report_rows(&root.join("second.tsv")).iter().all(|row| row.2 == 1));
}

#[test]
fn reads_gzipped_input() {
    let (_temp, root) = scratch_dir();
    let input = root.join("combined.fasta.gz");
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(COMBINED.as_bytes()).unwrap();
    fs::write(&input, encoder.finish().unwrap()).unwrap();

    let summary = Deduplicator::default()
        .run(&input, &root.join("dedup.fasta"), &root.join("report.tsv"))
        .unwrap();
    assert_eq!(summary.total_records, 4);
    assert_eq!(summary.unique_records, 2);
}

#[test]
fn missing_input_is_an_error() {
    let (_temp, root) = scratch_dir();
    let result = Deduplicator::default().run(
        &root.join("absent.fasta"),
        &root.join("dedup.fasta"),
        &root.join("report.tsv"),
    );
    assert!(result.is_err());
    assert!(!root.join("dedup.fasta").exists());
}
