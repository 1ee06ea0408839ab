use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::Level;
use tracing_subscriber::layer::Context;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{Layer, Registry};

use doc_intake_core::config::RunPolicy;
use doc_intake_core::contract::{
    AccessToken, Archiver, MockAnalyzer, MockArchiver, MockLibrary, MockTokenProvider, RemoteFile,
    Submission,
};
use doc_intake_core::error::{AnalyzeError, ArchiveError, AuthError, DownloadError, ListError};
use doc_intake_core::pipeline::{FileOutcome, Pipeline};

/// Counts error-level events emitted while installed as the default subscriber.
struct ErrorCounter {
    errors: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for ErrorCounter
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::ERROR {
            self.errors.lock().unwrap().push(format!("{event:?}"));
        }
    }
}

fn capture_errors() -> (Arc<Mutex<Vec<String>>>, tracing::subscriber::DefaultGuard) {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let subscriber = Registry::default().with(ErrorCounter {
        errors: errors.clone(),
    });
    let guard = tracing::subscriber::set_default(subscriber);
    (errors, guard)
}

/// In-memory blob store keyed by name, overwriting on every write.
#[derive(Default, Clone)]
struct MemoryArchiver {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    writes: Arc<Mutex<usize>>,
}

#[async_trait]
impl Archiver for MemoryArchiver {
    async fn store(&self, name: &str, content: &[u8]) -> Result<(), ArchiveError> {
        self.blobs
            .lock()
            .unwrap()
            .insert(name.to_string(), content.to_vec());
        *self.writes.lock().unwrap() += 1;
        Ok(())
    }
}

fn remote(name: &str) -> RemoteFile {
    RemoteFile {
        name: name.to_string(),
        download_url: format!("https://download.example/{name}"),
    }
}

fn ok_tokens() -> MockTokenProvider {
    let mut tokens = MockTokenProvider::new();
    tokens
        .expect_access_token()
        .times(1)
        .returning(|| Ok(AccessToken::new("token-1")));
    tokens
}

/// Library listing `names`, each downloading to `content of <name>`.
fn library_with(names: &'static [&'static str]) -> MockLibrary {
    let mut library = MockLibrary::new();
    library
        .expect_list_files()
        .times(1)
        .returning(move |_| Ok(names.iter().map(|n| remote(n)).collect()));
    library
        .expect_download()
        .times(names.len())
        .returning(|file| Ok(format!("content of {}", file.name).into_bytes()));
    library
}

fn accepting_analyzer(times: usize) -> MockAnalyzer {
    let mut analyzer = MockAnalyzer::new();
    analyzer
        .expect_submit()
        .times(times)
        .returning(|_, _| Ok(Submission::default()));
    analyzer
}

#[tokio::test]
async fn successful_run_archives_every_listed_file_byte_for_byte() {
    let archiver = MemoryArchiver::default();
    let pipeline = Pipeline::new(
        ok_tokens(),
        library_with(&["a.pdf", "b.pdf", "c.pdf"]),
        accepting_analyzer(3),
        archiver.clone(),
        RunPolicy::default(),
    );

    let report = pipeline.run_once().await.expect("run should succeed");

    assert_eq!(report.listed, 3);
    assert_eq!(report.failed(), 0);
    let blobs = archiver.blobs.lock().unwrap();
    let mut names: Vec<&String> = blobs.keys().collect();
    names.sort();
    assert_eq!(names, vec!["a.pdf", "b.pdf", "c.pdf"]);
    for (name, content) in blobs.iter() {
        assert_eq!(content, format!("content of {name}").as_bytes());
    }
}

#[tokio::test]
async fn rerunning_produces_the_same_archive_state() {
    let archiver = MemoryArchiver::default();

    for _ in 0..2 {
        let pipeline = Pipeline::new(
            ok_tokens(),
            library_with(&["a.pdf", "b.pdf"]),
            accepting_analyzer(2),
            archiver.clone(),
            RunPolicy::default(),
        );
        pipeline.run_once().await.expect("run should succeed");
    }

    let blobs = archiver.blobs.lock().unwrap();
    assert_eq!(blobs.len(), 2, "re-archiving must overwrite, not duplicate");
    assert_eq!(blobs["a.pdf"], b"content of a.pdf");
    assert_eq!(*archiver.writes.lock().unwrap(), 4);
}

#[tokio::test]
async fn empty_listing_does_nothing_and_logs_no_error() {
    let (errors, _guard) = capture_errors();

    let mut library = MockLibrary::new();
    library.expect_list_files().times(1).returning(|_| Ok(vec![]));
    library.expect_download().never();
    let mut analyzer = MockAnalyzer::new();
    analyzer.expect_submit().never();
    let mut archiver = MockArchiver::new();
    archiver.expect_store().never();

    let pipeline = Pipeline::new(
        ok_tokens(),
        library,
        analyzer,
        archiver,
        RunPolicy::default(),
    );
    let report = pipeline.run().await.expect("run should complete");

    assert_eq!(report.listed, 0);
    assert!(report.files.is_empty());
    assert!(
        errors.lock().unwrap().is_empty(),
        "no error expected, got {:?}",
        errors.lock().unwrap()
    );
}

#[tokio::test]
async fn failed_listing_stops_the_run_with_one_error() {
    let (errors, _guard) = capture_errors();

    let mut library = MockLibrary::new();
    library.expect_list_files().times(1).returning(|_| {
        Err(ListError::Status {
            status: 403,
            body: r#"{"error":{"code":"accessDenied"}}"#.to_string(),
        })
    });
    library.expect_download().never();
    let mut analyzer = MockAnalyzer::new();
    analyzer.expect_submit().never();
    let mut archiver = MockArchiver::new();
    archiver.expect_store().never();

    let pipeline = Pipeline::new(
        ok_tokens(),
        library,
        analyzer,
        archiver,
        RunPolicy::default(),
    );
    assert!(pipeline.run().await.is_none());

    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1, "expected exactly one error, got {errors:?}");
    assert!(errors[0].contains("403"), "status missing from {}", errors[0]);
    assert!(errors[0].contains("accessDenied"), "body missing from {}", errors[0]);
}

#[tokio::test]
async fn rejected_analysis_skips_only_that_file() {
    let archiver = MemoryArchiver::default();
    let mut analyzer = MockAnalyzer::new();
    analyzer.expect_submit().times(3).returning(|name, _| {
        if name == "b.docx" {
            Err(AnalyzeError::Rejected {
                status: 400,
                body: "InvalidImage".to_string(),
            })
        } else {
            Ok(Submission::default())
        }
    });

    let pipeline = Pipeline::new(
        ok_tokens(),
        library_with(&["a.pdf", "b.docx", "c.pdf"]),
        analyzer,
        archiver.clone(),
        RunPolicy::default(),
    );
    let report = pipeline.run_once().await.expect("per-file failure must not abort");

    let archived: Vec<&str> = report.archived().collect();
    assert_eq!(archived, vec!["a.pdf", "c.pdf"]);
    assert_eq!(
        report.files[1].outcome,
        FileOutcome::AnalysisRejected {
            status: 400,
            body: "InvalidImage".to_string()
        }
    );
    assert!(!archiver.blobs.lock().unwrap().contains_key("b.docx"));
}

#[tokio::test]
async fn token_failure_aborts_before_any_other_call() {
    let (errors, _guard) = capture_errors();

    let mut tokens = MockTokenProvider::new();
    tokens.expect_access_token().times(1).returning(|| {
        Err(AuthError::MissingToken {
            status: 401,
            error: "invalid_client".to_string(),
            description: "AADSTS7000215: Invalid client secret provided.".to_string(),
        })
    });
    let mut library = MockLibrary::new();
    library.expect_list_files().never();
    library.expect_download().never();
    let mut analyzer = MockAnalyzer::new();
    analyzer.expect_submit().never();
    let mut archiver = MockArchiver::new();
    archiver.expect_store().never();

    let pipeline = Pipeline::new(tokens, library, analyzer, archiver, RunPolicy::default());
    assert!(pipeline.run().await.is_none());

    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1, "expected exactly one error, got {errors:?}");
    assert!(errors[0].contains("invalid_client"));
}

#[tokio::test]
async fn failed_download_skips_file_and_continues() {
    let mut library = MockLibrary::new();
    library
        .expect_list_files()
        .returning(|_| Ok(vec![remote("gone.pdf"), remote("ok.pdf")]));
    library.expect_download().times(2).returning(|file| {
        if file.name == "gone.pdf" {
            Err(DownloadError::Status { status: 404 })
        } else {
            Ok(b"%PDF-1.7".to_vec())
        }
    });
    let mut analyzer = MockAnalyzer::new();
    analyzer
        .expect_submit()
        .withf(|name, _| name == "ok.pdf")
        .times(1)
        .returning(|_, _| Ok(Submission::default()));
    let archiver = MemoryArchiver::default();

    let pipeline = Pipeline::new(
        ok_tokens(),
        library,
        analyzer,
        archiver.clone(),
        RunPolicy {
            fail_on_download_status: true,
            ..RunPolicy::default()
        },
    );
    let report = pipeline.run_once().await.expect("run should succeed");

    assert!(matches!(
        report.files[0].outcome,
        FileOutcome::DownloadFailed { .. }
    ));
    assert_eq!(report.archived().collect::<Vec<_>>(), vec!["ok.pdf"]);
}

#[tokio::test]
async fn isolated_archive_failure_continues_with_next_file() {
    let mut archiver = MockArchiver::new();
    archiver.expect_store().times(2).returning(|name, _| {
        if name == "a.pdf" {
            Err(ArchiveError::Status {
                status: 403,
                body: "AuthorizationFailure".to_string(),
            })
        } else {
            Ok(())
        }
    });

    let pipeline = Pipeline::new(
        ok_tokens(),
        library_with(&["a.pdf", "b.pdf"]),
        accepting_analyzer(2),
        archiver,
        RunPolicy::default(),
    );
    let report = pipeline.run_once().await.expect("run should succeed");

    assert!(matches!(
        report.files[0].outcome,
        FileOutcome::ArchiveFailed { .. }
    ));
    assert_eq!(report.files[1].outcome, FileOutcome::Archived);
}

#[tokio::test]
async fn unisolated_archive_failure_aborts_remaining_files() {
    let mut library = MockLibrary::new();
    library
        .expect_list_files()
        .returning(|_| Ok(vec![remote("a.pdf"), remote("b.pdf")]));
    library
        .expect_download()
        .times(1)
        .returning(|_| Ok(b"bytes".to_vec()));
    let mut archiver = MockArchiver::new();
    archiver.expect_store().times(1).returning(|_, _| {
        Err(ArchiveError::Status {
            status: 500,
            body: String::new(),
        })
    });

    let pipeline = Pipeline::new(
        ok_tokens(),
        library,
        accepting_analyzer(1),
        archiver,
        RunPolicy {
            isolate_archive_failures: false,
            ..RunPolicy::default()
        },
    );

    let err = pipeline.run_once().await.expect_err("archive failure should abort");
    assert!(err.to_string().contains("a.pdf"));
}
