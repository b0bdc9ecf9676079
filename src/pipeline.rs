use std::fmt;

use tracing::{debug, error, info, warn};
use url::Url;

use crate::diff;
use crate::error::PipelineError;
use crate::extract::{self, Candidate};
use crate::fetcher::{self, PageFetcher};
use crate::history::{HistoryStore, Snapshot};
use crate::normalize::{self, Postings};
use crate::notify::{self, Dispatch, Notifier};
use crate::settings::Settings;
use crate::sites::SiteProfile;

/// Run states, in order. `Failed` is reachable from validation, fetching
/// and the history file being unreadable or unwritable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    Fetching,
    Extracting,
    Normalizing,
    Diffing,
    Notifying,
    Persisting,
    Done,
    Failed,
}

/// Outcome of one successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub site: &'static str,
    pub snapshot_len: usize,
    pub new_postings: Postings,
    pub dispatch: Dispatch,
    pub history_len: usize,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} postings, {} new, notification {:?}, {} snapshots on record",
            self.site,
            self.snapshot_len,
            self.new_postings.len(),
            self.dispatch,
            self.history_len
        )
    }
}

/// Diagnostic fetch: what the page looked like, nothing persisted.
#[derive(Debug)]
pub struct Inspection {
    pub url: Url,
    pub markup_len: usize,
    pub challenged: bool,
    pub selector_hits: Vec<(&'static str, usize)>,
    pub candidates: Vec<Candidate>,
    pub postings: Postings,
}

/// fetch → extract → normalize → diff → notify → persist for one site.
pub struct Pipeline<'a> {
    settings: &'a Settings,
    profile: &'a SiteProfile,
    fetcher: &'a dyn PageFetcher,
    notifier: Option<&'a dyn Notifier>,
    store: &'a HistoryStore,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        settings: &'a Settings,
        profile: &'a SiteProfile,
        fetcher: &'a dyn PageFetcher,
        notifier: Option<&'a dyn Notifier>,
        store: &'a HistoryStore,
    ) -> Self {
        Self {
            settings,
            profile,
            fetcher,
            notifier,
            store,
        }
    }

    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        let site = self.profile.key;
        match self.run_stages().await {
            Ok(report) => {
                self.enter(Stage::Done);
                info!("{}", report);
                Ok(report)
            }
            Err(e) => {
                self.enter(Stage::Failed);
                error!(site, "Run failed: {}", e);
                Err(e)
            }
        }
    }

    async fn run_stages(&self) -> Result<RunReport, PipelineError> {
        let site = self.profile.key;

        self.enter(Stage::Validating);
        let url = self.settings.career_page_url(self.profile)?;

        let markup = self.fetch(&url).await?;

        self.enter(Stage::Extracting);
        let candidates = extract::extract(&markup, self.profile);
        debug!(site, "Extracted {} candidates", candidates.len());

        self.enter(Stage::Normalizing);
        let current = normalize::normalize(candidates, self.profile.stoplist, Some(&url));

        self.enter(Stage::Diffing);
        // Corrupt files read as `None`; I/O errors end the run before notifying.
        let previous = self
            .store
            .read_last(site)
            .map_err(PipelineError::Persist)?;
        let bootstrap = previous.is_none();
        let new_postings = diff::new_postings(previous.as_ref().map(|s| &s.jobs), &current);

        self.enter(Stage::Notifying);
        let dispatch = if bootstrap
            && !new_postings.is_empty()
            && self.settings.suppress_bootstrap_notifications
        {
            info!(
                site,
                "First run: recording {} postings without notifying",
                new_postings.len()
            );
            Dispatch::Suppressed
        } else {
            notify::dispatch(self.notifier, self.profile.label, &new_postings).await
        };

        self.enter(Stage::Persisting);
        let snapshot_len = current.len();
        let history_len = self
            .store
            .append(site, Snapshot::now(current))
            .map_err(PipelineError::Persist)?;

        Ok(RunReport {
            site,
            snapshot_len,
            new_postings,
            dispatch,
            history_len,
        })
    }

    /// Fetch and extract without touching history or the notifier.
    pub async fn inspect(&self) -> Result<Inspection, PipelineError> {
        let url = self.settings.career_page_url(self.profile)?;
        let markup = self.fetch(&url).await?;

        let candidates = extract::extract(&markup, self.profile);
        let postings =
            normalize::normalize(candidates.clone(), self.profile.stoplist, Some(&url));

        Ok(Inspection {
            markup_len: markup.len(),
            challenged: fetcher::looks_challenged(&markup),
            selector_hits: extract::selector_hits(&markup, self.profile.diagnostic_selectors),
            candidates,
            postings,
            url,
        })
    }

    async fn fetch(&self, url: &Url) -> Result<String, PipelineError> {
        self.enter(Stage::Fetching);
        info!(site = self.profile.key, "Fetching {}", url);

        let markup = self
            .fetcher
            .fetch(url, &self.settings.fetch_policy())
            .await?;

        if fetcher::looks_challenged(&markup) {
            warn!(site = self.profile.key, "Cloudflare challenge detected in page content");
        }
        Ok(markup)
    }

    fn enter(&self, stage: Stage) {
        debug!(site = self.profile.key, ?stage, "stage");
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::error::HistoryError;
    use crate::fetcher::fakes::StaticPage;
    use crate::notify::fakes::RecordingNotifier;
    use crate::settings::SiteSettings;
    use crate::sites;

    const PAGE_V1: &str = r#"<html><body>
        <a href="/company/careers/">Careers</a>
        <a href="https://jobs.example.com/1">Security Engineer</a>
        <a href="//jobs.example.com/apply">Apply</a>
    </body></html>"#;

    const PAGE_V2: &str = r#"<html><body>
        <a href="/company/careers/">Careers</a>
        <a href="https://jobs.example.com/1">Security Engineer</a>
        <a href="//jobs.example.com/2">Data Analyst</a>
    </body></html>"#;

    struct Harness {
        _dir: TempDir,
        settings: Settings,
        store: HistoryStore,
    }

    impl Harness {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let store = HistoryStore::new(dir.path());
            Self {
                _dir: dir,
                settings: Settings::default(),
                store,
            }
        }

        async fn run(
            &self,
            site: &str,
            fetcher: &dyn PageFetcher,
            notifier: &RecordingNotifier,
        ) -> Result<RunReport, PipelineError> {
            let profile = sites::lookup(site).unwrap();
            Pipeline::new(&self.settings, profile, fetcher, Some(notifier), &self.store)
                .run()
                .await
        }
    }

    #[tokio::test]
    async fn unchanged_page_is_quiet_on_second_run() {
        let h = Harness::new();
        let page = StaticPage::serving(PAGE_V1);
        let notifier = RecordingNotifier::default();

        let first = h.run("flare", &page, &notifier).await.unwrap();
        assert_eq!(first.new_postings.len(), 1);
        assert_eq!(first.dispatch, Dispatch::Delivered);

        let second = h.run("flare", &page, &notifier).await.unwrap();
        assert!(second.new_postings.is_empty());
        assert_eq!(second.dispatch, Dispatch::Skipped);
        assert_eq!(notifier.count(), 1);
    }

    #[tokio::test]
    async fn every_run_appends_once() {
        let h = Harness::new();
        let notifier = RecordingNotifier::default();

        h.run("flare", &StaticPage::serving(PAGE_V1), &notifier).await.unwrap();
        let first = h.store.load("flare").unwrap()[0].clone();

        h.run("flare", &StaticPage::serving("<html></html>"), &notifier)
            .await
            .unwrap();
        let report = h
            .run("flare", &StaticPage::serving(PAGE_V2), &notifier)
            .await
            .unwrap();

        let history = h.store.load("flare").unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(report.history_len, 3);
        assert_eq!(history[0], first);
        assert!(history[1].jobs.is_empty());
    }

    #[tokio::test]
    async fn new_postings_only_against_last_snapshot() {
        let h = Harness::new();
        let notifier = RecordingNotifier::default();

        h.run("flare", &StaticPage::serving(PAGE_V1), &notifier).await.unwrap();
        let report = h
            .run("flare", &StaticPage::serving(PAGE_V2), &notifier)
            .await
            .unwrap();

        assert_eq!(
            report.new_postings,
            Postings::from([("Data Analyst".into(), "https://jobs.example.com/2".into())])
        );
        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].content.contains("Data Analyst"));
        assert!(!sent[1].content.contains("Security Engineer"));
    }

    #[tokio::test]
    async fn delivery_failure_still_persists() {
        let h = Harness::new();
        let notifier = RecordingNotifier::failing();

        let report = h
            .run("flare", &StaticPage::serving(PAGE_V1), &notifier)
            .await
            .unwrap();
        assert_eq!(report.dispatch, Dispatch::Failed);
        assert_eq!(h.store.load("flare").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fetch_failure_leaves_no_trace() {
        let h = Harness::new();
        let notifier = RecordingNotifier::default();

        let err = h.run("flare", &StaticPage::broken(), &notifier).await.unwrap_err();
        assert!(matches!(err, PipelineError::Fetch(_)));
        assert_eq!(notifier.count(), 0);
        assert!(!h.store.path("flare").exists());
    }

    #[tokio::test]
    async fn bad_config_fails_before_fetching() {
        let mut h = Harness::new();
        let notifier = RecordingNotifier::default();
        let page = StaticPage::serving(PAGE_V1);

        let err = h.run("botpress", &page, &notifier).await.unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));

        h.settings.sites.insert(
            "botpress".into(),
            SiteSettings {
                career_page_url: Some("botpress.com/careers".into()),
            },
        );
        let err = h.run("botpress", &page, &notifier).await.unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        assert!(!h.store.path("botpress").exists());
    }

    #[tokio::test]
    async fn corrupt_history_is_rebuilt() {
        let h = Harness::new();
        let notifier = RecordingNotifier::default();
        std::fs::write(h.store.path("flare"), "[{\"date\": 1}").unwrap();

        let report = h
            .run("flare", &StaticPage::serving(PAGE_V1), &notifier)
            .await
            .unwrap();
        assert_eq!(report.history_len, 1);
        assert_eq!(report.new_postings.len(), 1);
        assert_eq!(h.store.load("flare").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unwritable_history_is_fatal() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "").unwrap();

        let settings = Settings::default();
        let store = HistoryStore::new(&blocker);
        let notifier = RecordingNotifier::default();
        let page = StaticPage::serving(PAGE_V1);
        let profile = sites::lookup("flare").unwrap();

        let err = Pipeline::new(&settings, profile, &page, Some(&notifier), &store)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Persist(HistoryError::Io { .. })));
    }

    #[tokio::test]
    async fn unreadable_history_fails_without_notifying() {
        let h = Harness::new();
        let notifier = RecordingNotifier::default();
        std::fs::create_dir(h.store.path("flare")).unwrap();

        let err = h
            .run("flare", &StaticPage::serving(PAGE_V1), &notifier)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Persist(HistoryError::Io { .. })));
        assert_eq!(notifier.count(), 0);
        assert!(h.store.path("flare").is_dir());
        assert!(!h.store.path("flare").with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn bootstrap_notifications_can_be_suppressed() {
        let mut h = Harness::new();
        h.settings.suppress_bootstrap_notifications = true;
        let notifier = RecordingNotifier::default();

        let first = h
            .run("flare", &StaticPage::serving(PAGE_V1), &notifier)
            .await
            .unwrap();
        assert_eq!(first.dispatch, Dispatch::Suppressed);
        assert_eq!(notifier.count(), 0);

        let second = h
            .run("flare", &StaticPage::serving(PAGE_V2), &notifier)
            .await
            .unwrap();
        assert_eq!(second.dispatch, Dispatch::Delivered);
        assert_eq!(notifier.count(), 1);
    }

    #[tokio::test]
    async fn structured_site_end_to_end() {
        let mut h = Harness::new();
        h.settings.sites.insert(
            "botpress".into(),
            SiteSettings {
                career_page_url: Some("https://botpress.com/careers".into()),
            },
        );
        let markup = std::fs::read_to_string("tests/fixtures/botpress.html").unwrap();
        let notifier = RecordingNotifier::default();

        let report = h
            .run("botpress", &StaticPage::serving(markup), &notifier)
            .await
            .unwrap();
        assert_eq!(report.snapshot_len, 4);
        assert_eq!(
            report.new_postings["Office Manager - Quebec City"],
            "https://apply.workable.com/botpress/j/C1/"
        );
        let sent = notifier.sent.lock().unwrap();
        assert!(sent[0].content.starts_with("🚀 **New Job Postings Detected @ Botpress**"));
    }

    #[tokio::test]
    async fn inspect_does_not_persist() {
        let h = Harness::new();
        let profile = sites::lookup("flare").unwrap();
        let page = StaticPage::serving(PAGE_V1);

        let report = Pipeline::new(&h.settings, profile, &page, None, &h.store)
            .inspect()
            .await
            .unwrap();
        assert_eq!(report.candidates.len(), 3);
        assert_eq!(report.postings.len(), 1);
        assert!(!report.challenged);
        assert!(!h.store.path("flare").exists());
    }
}
