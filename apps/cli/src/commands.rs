use axum::Router;
use dapper_ssg::{
    BuildReport, ConfigOverrides, DEFAULT_CONFIG_PATH, DEFAULT_LAYOUT, DEFAULT_LAYOUT_DIR,
    DEFAULT_SOURCE_DIR, DapperError, SiteConfig, Watcher,
};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Sender, channel};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tower_http::services::ServeDir;

const STARTER_CONFIG: &str = "name: My Site\n";
const STARTER_INDEX: &str = "---\nlayout: index\ntitle: Welcome\n---\nHello world.\n";

/// Where the site lives, as given on the command line.
#[derive(Debug, Clone)]
pub struct SitePaths {
    pub config: PathBuf,
    pub overrides: ConfigOverrides,
}

impl SitePaths {
    fn load(&self) -> Result<SiteConfig, DapperError> {
        Ok(SiteConfig::load(&self.config)?.with_overrides(&self.overrides))
    }

    fn build(&self, clean: bool) -> Result<BuildReport, DapperError> {
        dapper_ssg::build_site(&self.config, &self.overrides, clean)
    }
}

pub fn init_site(root: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if root.join(DEFAULT_CONFIG_PATH).exists() {
        return Err(format!("{DEFAULT_CONFIG_PATH} already exists in this directory").into());
    }

    let layout_dir = root.join(DEFAULT_LAYOUT_DIR);
    let source_dir = root.join(DEFAULT_SOURCE_DIR);
    fs::create_dir_all(&layout_dir)?;
    fs::create_dir_all(&source_dir)?;

    fs::write(root.join(DEFAULT_CONFIG_PATH), STARTER_CONFIG)?;
    fs::write(layout_dir.join("index.html"), DEFAULT_LAYOUT)?;
    fs::write(source_dir.join("index.md"), STARTER_INDEX)?;

    println!("Initialized Dapper site in {}", root.display());
    println!("  dapper build");
    println!("  dapper serve");

    Ok(())
}

fn print_report(report: &BuildReport) {
    for error in &report.errors {
        eprintln!("  {error}");
    }
}

fn run_build(paths: &SitePaths, clean: bool) -> Result<BuildReport, DapperError> {
    println!("Building site...");
    let start = Instant::now();

    let report = paths.build(clean)?;
    print_report(&report);
    println!("Built {report} in {:.2?}", start.elapsed());

    Ok(report)
}

pub fn build_site(paths: &SitePaths, clean: bool) -> Result<(), Box<dyn std::error::Error>> {
    let report = run_build(paths, clean)?;

    if !report.is_clean() {
        return Err(format!("{} file(s) failed to build", report.errors.len()).into());
    }

    Ok(())
}

/// Starts the poll loop on its own thread. Dropping or signalling the
/// returned sender stops it after the current tick.
///
/// Rebuilds never clean the output directory. The watched paths are reloaded
/// from the config after each rebuild; a config that fails to load keeps the
/// previous paths.
fn spawn_watcher(
    paths: SitePaths,
    interval: Duration,
    mut on_rebuild: impl FnMut(&BuildReport) + Send + 'static,
) -> Result<(Sender<()>, JoinHandle<()>), DapperError> {
    let watched = paths.load()?.watched_paths();
    let (stop_tx, stop_rx) = channel();

    let reload = paths.clone();
    let mut watcher = Watcher::new(watched, move || paths.build(false))
        .interval(interval)
        .refresh_paths(move || reload.load().ok().map(|config| config.watched_paths()));
    watcher.init();

    let handle = std::thread::spawn(move || {
        watcher.run(&stop_rx, |report| {
            print_report(report);
            println!("Rebuilt {report}");
            on_rebuild(report);
        });
    });

    Ok((stop_tx, handle))
}

fn stop_watcher(stop_tx: Sender<()>, handle: JoinHandle<()>) {
    let _ = stop_tx.send(());
    if handle.join().is_err() {
        eprintln!("Watcher thread panicked");
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to listen for Ctrl+C");
    }
}

pub async fn watch_site(
    paths: SitePaths,
    interval: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let (stop_tx, handle) = spawn_watcher(paths, interval, |_| {})?;

    println!("Watching for changes every {interval:?}");
    println!("Press Ctrl+C to stop");

    shutdown_signal().await;
    stop_watcher(stop_tx, handle);

    Ok(())
}

pub async fn serve_site(
    paths: SitePaths,
    port: u16,
    interval: Duration,
    clean: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    run_build(&paths, clean)?;
    let output_dir = paths.load()?.output_dir;

    let livereload = tower_livereload::LiveReloadLayer::new();
    let reloader = livereload.reloader();

    let (stop_tx, handle) = spawn_watcher(paths, interval, move |_| reloader.reload())?;

    let serve_dir = ServeDir::new(&output_dir).append_index_html_on_directories(true);
    let app = Router::new().fallback_service(serve_dir).layer(livereload);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    println!("Serving {} at http://{addr}", output_dir.display());
    println!("Press Ctrl+C to stop");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    stop_watcher(stop_tx, handle);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn paths(root: &Path) -> SitePaths {
        SitePaths {
            config: root.join(DEFAULT_CONFIG_PATH),
            overrides: ConfigOverrides::default(),
        }
    }

    #[test]
    fn test_init_scaffold_files() {
        let dir = TempDir::new().unwrap();
        init_site(dir.path()).unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join("_config.yml")).unwrap(),
            "name: My Site\n"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("_layout/index.html")).unwrap(),
            DEFAULT_LAYOUT
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("_source/index.md")).unwrap(),
            "---\nlayout: index\ntitle: Welcome\n---\nHello world.\n"
        );
    }

    #[test]
    fn test_init_refuses_existing_site() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("_config.yml"), "name: Mine\n").unwrap();

        assert!(init_site(dir.path()).is_err());
        assert_eq!(
            fs::read_to_string(dir.path().join("_config.yml")).unwrap(),
            "name: Mine\n"
        );
        assert!(!dir.path().join("_source").exists());
    }

    #[test]
    fn test_scaffolded_site_builds() {
        let dir = TempDir::new().unwrap();
        init_site(dir.path()).unwrap();

        build_site(&paths(dir.path()), false).unwrap();

        let index = fs::read_to_string(dir.path().join("_output/index.html")).unwrap();
        assert!(index.contains("<title>Welcome</title>"));
        assert!(index.contains("<header>My Site</header>"));
        assert!(index.contains("<p>Hello world.</p>"));
    }

    #[test]
    fn test_build_fails_on_file_errors() {
        let dir = TempDir::new().unwrap();
        init_site(dir.path()).unwrap();
        fs::write(dir.path().join("_source/broken.md"), "---\nnever closed").unwrap();

        assert!(build_site(&paths(dir.path()), false).is_err());
        assert!(dir.path().join("_output/index.html").exists());
    }

    #[test]
    fn test_watcher_thread_stops_on_signal() {
        let dir = TempDir::new().unwrap();
        init_site(dir.path()).unwrap();

        let (stop_tx, handle) =
            spawn_watcher(paths(dir.path()), Duration::from_millis(10), |_| {}).unwrap();

        let start = Instant::now();
        stop_watcher(stop_tx, handle);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    fn wait_for(rebuilds: &AtomicUsize, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while rebuilds.load(Ordering::SeqCst) < count && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(rebuilds.load(Ordering::SeqCst), count);
    }

    fn counting_watcher(root: &Path) -> (Arc<AtomicUsize>, Sender<()>, JoinHandle<()>) {
        let rebuilds = Arc::new(AtomicUsize::new(0));
        let counter = rebuilds.clone();
        let (stop_tx, handle) = spawn_watcher(paths(root), Duration::from_millis(10), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        (rebuilds, stop_tx, handle)
    }

    #[test]
    fn test_rebuilds_keep_existing_output() {
        let dir = TempDir::new().unwrap();
        init_site(dir.path()).unwrap();
        build_site(&paths(dir.path()), true).unwrap();
        fs::write(dir.path().join("_output/robots.txt"), "User-agent: *\n").unwrap();

        let (rebuilds, stop_tx, handle) = counting_watcher(dir.path());
        fs::write(dir.path().join("_source/about.md"), "About").unwrap();
        wait_for(&rebuilds, 1);
        stop_watcher(stop_tx, handle);

        assert!(dir.path().join("_output/about.html").exists());
        assert!(dir.path().join("_output/robots.txt").exists());
    }

    #[test]
    fn test_watcher_follows_source_moved_in_config() {
        let dir = TempDir::new().unwrap();
        init_site(dir.path()).unwrap();
        fs::create_dir_all(dir.path().join("pages")).unwrap();
        fs::write(dir.path().join("pages/index.md"), "Moved").unwrap();

        let (rebuilds, stop_tx, handle) = counting_watcher(dir.path());
        fs::write(
            dir.path().join("_config.yml"),
            "name: My Site\nsource: pages\n",
        )
        .unwrap();
        wait_for(&rebuilds, 1);

        fs::write(dir.path().join("pages/about.md"), "About").unwrap();
        wait_for(&rebuilds, 2);
        stop_watcher(stop_tx, handle);

        assert!(dir.path().join("_output/about.html").exists());
    }
}
