//! Classification through the shared rule cache.
mod classification {
    use std::sync::Arc;
    use std::sync::OnceLock;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use dialog_extract::{
        CacheLoadError, CacheStatus, Category, ClassifierConfig, Classifier, ClassifyError,
        LanguageCode, RuleCache, RuleSet, RuleSource, StaticRuleSource,
    };
    use futures_util::future::join_all;
    use pretty_assertions::assert_eq;
    use testresult::TestResult;

    const RULES_STR: &str = include_str!("./fixtures/classification_rules.json");
    static RULES: OnceLock<StaticRuleSource> = OnceLock::new();
    fn rules() -> &'static StaticRuleSource {
        RULES.get_or_init(|| {
            StaticRuleSource::from_json_str(RULES_STR).expect("fixture is not a rule set")
        })
    }

    /// A rule source that takes its time, can be switched to failing and
    /// counts how often it is asked.
    struct TestSource {
        delay: Duration,
        failing: AtomicBool,
        calls: AtomicUsize,
    }

    impl TestSource {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(TestSource {
                delay,
                failing: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            })
        }

        fn fail(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RuleSource for TestSource {
        async fn load(&self) -> Result<RuleSet, CacheLoadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.failing.load(Ordering::SeqCst) {
                return Err(CacheLoadError::Source("rule service unreachable".into()));
            }
            Ok(rules().rules().clone())
        }
    }

    fn classifier(source: Arc<TestSource>) -> Classifier {
        Classifier::new(Arc::new(RuleCache::new(source)), ClassifierConfig::default())
    }

    fn both() -> [LanguageCode; 2] {
        [LanguageCode::english(), LanguageCode::italian()]
    }

    #[tokio::test]
    async fn fixture_rules_classify_by_priority() -> TestResult {
        let classifier = classifier(TestSource::new(Duration::ZERO));

        let cases = [
            ("ask for the customer's phone number", Category::RequestData),
            ("Please confirm the address", Category::Confirmation),
            ("Recap of the order", Category::Summary),
            ("Identify the kind of problem", Category::ProblemClassification),
            ("Describe your problem", Category::GenericProblem),
            ("Tell the customer we are closed", Category::Message),
            ("Conferma il numero", Category::Confirmation),
            ("Chiedi il codice fiscale", Category::RequestData),
            ("Comunica l'esito", Category::Message),
            ("zzz", Category::Undetermined),
        ];
        for (label, expected) in cases {
            assert_eq!(classifier.classify(label, &both()).await?, expected, "{label}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn language_order_is_respected() -> TestResult {
        let classifier = classifier(TestSource::new(Duration::ZERO));

        assert_eq!(
            classifier.classify_label("Conferma il numero").await?,
            Category::Undetermined
        );
        assert_eq!(
            classifier
                .classify("Conferma il numero", &[LanguageCode::new("fr"), LanguageCode::new("it")])
                .await?,
            Category::Confirmation
        );
        Ok(())
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn concurrent_first_callers_share_one_load() -> TestResult {
        let source = TestSource::new(Duration::from_secs(2));
        let classifier = classifier(source.clone());

        let labels = [
            "ask for the date",
            "confirm the date",
            "recap",
            "describe the issue",
            "say hello",
            "zzz",
        ];
        let answers = join_all(labels.iter().map(|label| classifier.classify_label(label))).await;

        assert_eq!(source.calls(), 1);
        assert_eq!(classifier.cache().load_count(), 1);
        let answers = answers.into_iter().collect::<Result<Vec<_>, _>>()?;
        assert_eq!(
            answers,
            vec![
                Category::RequestData,
                Category::Confirmation,
                Category::Summary,
                Category::GenericProblem,
                Category::Message,
                Category::Undetermined,
            ]
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_callers_share_one_load() -> TestResult {
        let source = TestSource::new(Duration::from_millis(500));
        let classifier = classifier(source.clone());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let classifier = classifier.clone();
                tokio::spawn(async move { classifier.classify_label("confirm the order").await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await??, Category::Confirmation);
        }
        assert_eq!(source.calls(), 1);
        assert_eq!(classifier.cache().status(), CacheStatus::Ready);
        Ok(())
    }

    #[tokio::test]
    async fn failed_load_is_reported_until_a_reload_succeeds() -> TestResult {
        let source = TestSource::new(Duration::ZERO);
        source.fail(true);
        let classifier = classifier(source.clone());

        let error = classifier.classify_label("confirm").await.err().ok_or("expected an error")?;
        assert!(matches!(error, ClassifyError::CacheLoad(CacheLoadError::Source(_))));
        assert!(classifier.classify_label("confirm").await.is_err());
        assert_eq!(classifier.cache().status(), CacheStatus::Failed);
        assert_eq!(source.calls(), 1);

        source.fail(false);
        classifier.cache().reload().await?;
        assert_eq!(classifier.classify_label("confirm").await?, Category::Confirmation);
        assert_eq!(source.calls(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn failed_reload_keeps_the_previous_rules() -> TestResult {
        let source = TestSource::new(Duration::ZERO);
        let classifier = classifier(source.clone());
        let before = classifier.cache().ready().await?;

        source.fail(true);
        assert!(classifier.cache().reload().await.is_err());

        assert_eq!(classifier.cache().status(), CacheStatus::Ready);
        let current = classifier.cache().snapshot().ok_or("no snapshot")?;
        assert!(Arc::ptr_eq(&before, &current));
        assert_eq!(classifier.classify_label("recap").await?, Category::Summary);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn readers_see_the_old_rules_while_a_reload_runs() -> TestResult {
        let source = TestSource::new(Duration::from_secs(1));
        let cache = RuleCache::new(source.clone());
        let before = cache.ready().await?;

        let reload = cache.reload();
        tokio::pin!(reload);
        assert!(futures_util::poll!(reload.as_mut()).is_pending());
        assert_eq!(cache.status(), CacheStatus::Loading);

        let during = cache.ready().await?;
        assert!(Arc::ptr_eq(&before, &during));

        let after = reload.await?;
        assert!(!Arc::ptr_eq(&before, &after));
        let current = cache.snapshot().ok_or("no snapshot")?;
        assert!(Arc::ptr_eq(&after, &current));
        assert_eq!(source.calls(), 2);
        Ok(())
    }
}
