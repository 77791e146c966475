use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use snpflow::config::SampleSection;
use snpflow::fs::mock::MockFileSystem;
use snpflow::fs::{FileSystem, RealFileSystem};
use snpflow::pipeline::{PipelineRunState, ProgressStore};
use snpflow::stages::discover_samples;
use snpflow_test_utils::test_stage::linear_catalog;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn mock_fs_tracks_files_and_implicit_dirs() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_file("data/a/one.txt", "1");
    fs.add_file("data/two.txt", "2");

    assert!(fs.is_dir(Path::new("data/a")));
    assert!(fs.is_file(Path::new("data/two.txt")));
    assert_eq!(fs.read_to_string(Path::new("data/a/one.txt"))?, "1");
    assert_eq!(
        fs.read_dir(Path::new("data"))?,
        vec![PathBuf::from("data/a"), PathBuf::from("data/two.txt")]
    );

    fs.rename(Path::new("data/two.txt"), Path::new("data/2.txt"))?;
    assert!(!fs.exists(Path::new("data/two.txt")));
    assert_eq!(fs.file_contents("data/2.txt").as_deref(), Some("2"));

    fs.set_read_only(true);
    assert!(fs.remove_file(Path::new("data/2.txt")).is_err());
    assert!(fs.write(Path::new("data/3.txt"), b"3").is_err());
    Ok(())
}

#[test]
fn samples_are_paired_by_suffix_and_sorted() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_file("reads/B_clean_1.fastq.gz", "");
    fs.add_file("reads/B_clean_2.fastq.gz", "");
    fs.add_file("reads/A_clean_1.fastq.gz", "");
    fs.add_file("reads/notes.txt", "");
    fs.add_dir("reads/nested_clean_1.fastq.gz");

    let samples = discover_samples(&fs, Path::new("reads"), &SampleSection::default())?;

    let names: Vec<_> = samples.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["A", "B"]);
    assert!(!samples[0].is_paired());
    assert!(samples[1].is_paired());
    assert_eq!(
        samples[1].reads(),
        vec![
            PathBuf::from("reads/B_clean_1.fastq.gz"),
            PathBuf::from("reads/B_clean_2.fastq.gz")
        ]
    );
    Ok(())
}

#[test]
fn custom_suffixes_and_missing_dir() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_file("reads/S9_R1.fq", "");
    fs.add_file("reads/S9_R2.fq", "");
    let naming = SampleSection {
        read1_suffix: "_R1.fq".to_string(),
        read2_suffix: "_R2.fq".to_string(),
    };

    let samples = discover_samples(&fs, Path::new("reads"), &naming)?;
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].name, "S9");

    assert!(discover_samples(&fs, Path::new("elsewhere"), &naming)?.is_empty());
    Ok(())
}

#[test]
fn real_fs_discovery_matches_mock() -> TestResult {
    let dir = TempDir::new()?;
    fs::write(dir.path().join("X_clean_1.fastq.gz"), "")?;
    fs::write(dir.path().join("X_clean_2.fastq.gz"), "")?;

    let samples = discover_samples(&RealFileSystem, dir.path(), &SampleSection::default())?;

    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].read1, dir.path().join("X_clean_1.fastq.gz"));
    assert!(samples[0].is_paired());
    Ok(())
}

#[test]
fn progress_file_is_replaced_atomically_on_disk() -> TestResult {
    let dir = TempDir::new()?;
    let path = dir.path().join("out").join(".progress");
    let catalog = linear_catalog(&["a", "b", "c"]);
    let store = ProgressStore::new(&path, Arc::new(RealFileSystem));

    assert_eq!(store.load(&catalog)?, PipelineRunState::new());

    fs::create_dir_all(dir.path().join("out"))?;
    fs::write(&path, "c\na\n")?;
    let state = store.load(&catalog)?;
    assert!(state.is_completed("a"));
    assert!(state.is_completed("c"));
    assert_eq!(state.ordered_ids(&catalog), vec!["a", "c"]);

    store.persist(&state, &catalog)?;
    assert_eq!(fs::read_to_string(&path)?, "a\nc\n");
    assert!(!dir.path().join("out").join(".progress.tmp").exists());
    Ok(())
}
