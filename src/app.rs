use crate::config::AppConfig;
use crate::data::load_dataset;
use crate::page::write_outputs;
use crate::scene::Scene;
use crate::types::Dataset;
use anyhow::Result;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Debug)]
pub enum RunOutcome {
    Rendered(Vec<PathBuf>),
    /// Loading failed and was reported; nothing was written.
    LoadFailed,
}

/// Loads the dataset, reporting a failure exactly once.
pub async fn load_or_report(config: &AppConfig) -> Option<Dataset> {
    match load_dataset(config).await {
        Ok(dataset) => Some(dataset),
        Err(e) => {
            error!("Error loading data: {}", e);
            None
        }
    }
}

/// Loads both inputs, builds the scene, writes the page.
pub async fn render(config: &AppConfig) -> Result<RunOutcome> {
    let Some(dataset) = load_or_report(config).await else {
        return Ok(RunOutcome::LoadFailed);
    };

    let scene = Scene::build(&dataset, config);
    let written = write_outputs(config, &dataset, &scene)?;
    info!("Rendered {} files into {:?}", written.len(), config.output.dir);
    Ok(RunOutcome::Rendered(written))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CSV, GEOJSON};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    #[derive(Clone, Default)]
    struct ErrorCount(Arc<AtomicUsize>);

    impl<S: Subscriber> Layer<S> for ErrorCount {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::ERROR {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// Renders with a thread-local subscriber and reports how many errors were logged.
    async fn render_counting_errors(config: &AppConfig) -> (RunOutcome, usize) {
        let counter = ErrorCount::default();
        let subscriber = tracing_subscriber::registry().with(counter.clone());
        let _guard = tracing::subscriber::set_default(subscriber);
        let outcome = render(config).await.unwrap();
        (outcome, counter.0.load(Ordering::SeqCst))
    }

    fn config_for(dir: &std::path::Path, geometry: Option<&str>, metrics: Option<&str>) -> AppConfig {
        let mut config = AppConfig::default();
        let geometry_path = dir.join("regions.geojson");
        let metrics_path = dir.join("milk.csv");
        if let Some(content) = geometry {
            fs::write(&geometry_path, content).unwrap();
        }
        if let Some(content) = metrics {
            fs::write(&metrics_path, content).unwrap();
        }
        config.input.geometry = geometry_path.display().to_string();
        config.input.metrics = metrics_path.display().to_string();
        config.output.dir = dir.join("out");
        config
    }

    #[tokio::test]
    async fn missing_metrics_logs_one_error_and_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_for(tmp.path(), Some(GEOJSON), None);

        let (outcome, errors) = render_counting_errors(&config).await;
        assert!(matches!(outcome, RunOutcome::LoadFailed));
        assert_eq!(errors, 1);
        assert!(!config.output.dir.exists());
    }

    #[tokio::test]
    async fn missing_geometry_logs_one_error_and_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_for(tmp.path(), None, Some(CSV));

        let (outcome, errors) = render_counting_errors(&config).await;
        assert!(matches!(outcome, RunOutcome::LoadFailed));
        assert_eq!(errors, 1);
        assert!(!config.output.dir.exists());
    }

    #[tokio::test]
    async fn both_inputs_failing_still_log_once() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_for(tmp.path(), Some("not json"), Some("Region,2021\nBern,1\n"));

        let (outcome, errors) = render_counting_errors(&config).await;
        assert!(matches!(outcome, RunOutcome::LoadFailed));
        assert_eq!(errors, 1);
        assert!(!config.output.dir.exists());
    }

    #[tokio::test]
    async fn successful_render_logs_no_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_for(tmp.path(), Some(GEOJSON), Some(CSV));

        let (outcome, errors) = render_counting_errors(&config).await;
        assert!(matches!(outcome, RunOutcome::Rendered(_)));
        assert_eq!(errors, 0);
    }

    #[tokio::test]
    async fn local_inputs_render_page() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_for(tmp.path(), Some(GEOJSON), Some(CSV));

        match render(&config).await.unwrap() {
            RunOutcome::Rendered(files) => assert_eq!(files.len(), 3),
            RunOutcome::LoadFailed => panic!("local fixtures should load"),
        }
        assert!(config.output.dir.join("index.html").exists());
    }
}
