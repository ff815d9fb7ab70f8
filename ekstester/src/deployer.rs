use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use tracing::{debug, info};

use crate::{
  config::Config,
  control::Control,
  error::{Error, Result},
  runner::{self, Invocation},
};

/// Binaries that must be on `PATH` for a cluster to be tested
pub const AWSTESTER: &str = "awstester";
pub const KUBECTL: &str = "kubectl";
pub const AWS_IAM_AUTHENTICATOR: &str = "aws-iam-authenticator";

/// Cluster lifecycle operations used by the test harness
#[async_trait]
pub trait Deployer {
  /// Create the cluster
  async fn up(&mut self) -> Result<()>;

  /// Tear the cluster down
  async fn down(&mut self) -> Result<()>;

  /// Error unless the cluster is up and `ACTIVE`
  async fn is_up(&mut self) -> Result<()>;

  /// Check the test cluster has been set up
  async fn test_setup(&mut self) -> Result<()>;

  /// Creation time of the running cluster
  async fn get_cluster_created(&mut self) -> Result<Option<DateTime<Utc>>>;

  /// Upload a local file or directory to S3
  async fn dump_cluster_logs(&mut self, local_path: &Path, s3_path: &str) -> Result<()>;
}

/// Publishes the results of a test run
#[async_trait]
pub trait Publisher {
  async fn publish(&mut self) -> Result<()>;
}

/// ALB ingress controller checks run against a live cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum AlbTest {
  Correctness,
  Qps,
  Metrics,
}

impl AlbTest {
  fn name(&self) -> &'static str {
    match self {
      AlbTest::Correctness => "correctness",
      AlbTest::Qps => "qps",
      AlbTest::Metrics => "metrics",
    }
  }
}

/// EKS tester driving the `awstester` binary
///
/// Every operation runs one `awstester eks --path=<config> ...` command under the
/// tester's `Control`, which holds the deadline and stop signal for its lifetime.
#[derive(Debug)]
pub struct Tester {
  config: Config,
  control: Control,
  awstester_path: PathBuf,
}

fn look_path(name: &str) -> Result<PathBuf> {
  which::which(name).map_err(|source| Error::ExecutableNotFound {
    name: name.to_owned(),
    source,
  })
}

impl Tester {
  /// Create a tester, resolving `awstester`, `kubectl`, and `aws-iam-authenticator` on `PATH`
  pub fn new(config: Config, control: Control) -> Result<Self> {
    let awstester_path = look_path(AWSTESTER)?;
    let kubectl_path = look_path(KUBECTL)?;
    look_path(AWS_IAM_AUTHENTICATOR)?;
    debug!("Using {} and {}", awstester_path.display(), kubectl_path.display());

    Ok(Self::with_executable(config, control, awstester_path))
  }

  /// Create a tester around an explicit `awstester` executable
  pub fn with_executable(mut config: Config, control: Control, awstester_path: impl Into<PathBuf>) -> Self {
    config.embedded = false;
    Self {
      config,
      control,
      awstester_path: awstester_path.into(),
    }
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn control(&self) -> &Control {
    &self.control
  }

  /// Interrupt any in-flight command; later commands are not started
  pub fn stop(&self) {
    self.control.stop_signal().request_stop();
  }

  /// Reload the configuration from disk
  pub fn load_config(&mut self) -> Result<&Config> {
    let path = self.config.config_path.clone();
    let mut config = Config::load(&path).map_err(|source| Error::ReloadFailed { path, source })?;
    config.embedded = false;
    self.config = config;

    Ok(&self.config)
  }

  fn invocation(&self, args: &[&str]) -> Invocation {
    let path = format!("--path={}", self.config.config_path.display());
    let argv = ["eks", path.as_str()].into_iter().chain(args.iter().copied());

    Invocation::new(&self.awstester_path, argv).named(args.join(" "))
  }

  async fn exec(&self, args: &[&str]) -> Result<String> {
    runner::run(&self.invocation(args), &self.control).await.into_result()
  }

  /// Reload the configuration and run the named `test` subcommand
  pub async fn run_subtest(&mut self, name: &[&str]) -> Result<()> {
    self.load_config()?;

    let args = ["test"].into_iter().chain(name.iter().copied()).collect::<Vec<_>>();
    self.exec(&args).await?;

    Ok(())
  }

  pub async fn test_alb(&mut self, test: AlbTest) -> Result<()> {
    self.run_subtest(&["alb", test.name()]).await
  }

  pub async fn test_alb_correctness(&mut self) -> Result<()> {
    self.test_alb(AlbTest::Correctness).await
  }

  pub async fn test_alb_qps(&mut self) -> Result<()> {
    self.test_alb(AlbTest::Qps).await
  }

  pub async fn test_alb_metrics(&mut self) -> Result<()> {
    self.test_alb(AlbTest::Metrics).await
  }
}

/// S3 key the log output is published under: `<cluster>/<file name>`
pub fn publish_s3_path(cluster_name: &str, log_output: &Path) -> String {
  let base = log_output
    .file_name()
    .map(|name| name.to_string_lossy().to_string())
    .unwrap_or_default();

  format!("{cluster_name}/{base}")
}

#[async_trait]
impl Deployer for Tester {
  async fn up(&mut self) -> Result<()> {
    self.exec(&["create", "cluster"]).await?;
    info!("Cluster {} created", self.config.cluster_name);

    Ok(())
  }

  async fn down(&mut self) -> Result<()> {
    self.exec(&["delete", "cluster"]).await?;
    info!("Cluster {} deleted", self.config.cluster_name);

    Ok(())
  }

  async fn is_up(&mut self) -> Result<()> {
    self.exec(&["check", "cluster"]).await?;

    let config = self.load_config()?;
    if !config.is_active() {
      return Err(Error::StateMismatch {
        cluster: config.cluster_name.to_owned(),
        status: config.cluster_state.status.to_owned(),
      });
    }

    Ok(())
  }

  async fn test_setup(&mut self) -> Result<()> {
    self.is_up().await
  }

  async fn get_cluster_created(&mut self) -> Result<Option<DateTime<Utc>>> {
    self.is_up().await?;

    Ok(self.load_config()?.cluster_state.created)
  }

  async fn dump_cluster_logs(&mut self, local_path: &Path, s3_path: &str) -> Result<()> {
    let local = local_path.to_string_lossy();
    self.exec(&["s3-upload", &*local, s3_path]).await?;

    Ok(())
  }
}

#[async_trait]
impl Publisher for Tester {
  async fn publish(&mut self) -> Result<()> {
    let config = self.load_config()?;
    let local_path = config.log_output_to_upload_path.to_owned();
    let s3_path = publish_s3_path(&config.cluster_name, &local_path);
    info!("Publishing {} to {s3_path}", local_path.display());

    self.dump_cluster_logs(&local_path, &s3_path).await
  }
}

#[cfg(test)]
mod tests {
  use std::{fs, os::unix::fs::PermissionsExt};

  use rstest::*;
  use tempfile::TempDir;
  use tokio::time::{Duration, Instant};

  use super::*;
  use crate::config::ClusterState;

  /// Scratch directory holding a config file and a stub `awstester`
  ///
  /// The stub appends its arguments to `args.log`, then runs `body`.
  struct Fixture {
    dir: TempDir,
    config_path: PathBuf,
    awstester: PathBuf,
  }

  impl Fixture {
    fn new(status: &str, body: &str) -> Self {
      let dir = TempDir::new().unwrap();
      let config_path = dir.path().join("ekstester.yaml");
      let config = Config {
        cluster_name: "demo".to_owned(),
        log_output_to_upload_path: PathBuf::from("/var/log/run.log"),
        cluster_state: ClusterState {
          status: status.to_owned(),
          created: Some("2018-11-29T21:42:33Z".parse().unwrap()),
        },
        ..Default::default()
      };
      config.write(&config_path).unwrap();

      let awstester = dir.path().join(AWSTESTER);
      let log = dir.path().join("args.log");
      fs::write(
        &awstester,
        format!("#!/bin/sh\necho \"$@\" >> {}\n{body}\n", log.display()),
      )
      .unwrap();
      fs::set_permissions(&awstester, fs::Permissions::from_mode(0o755)).unwrap();

      Self {
        dir,
        config_path,
        awstester,
      }
    }

    fn tester(&self, timeout: Duration) -> Tester {
      let config = Config::load(&self.config_path).unwrap();
      Tester::with_executable(config, Control::new(timeout), &self.awstester)
    }

    fn calls(&self) -> Vec<String> {
      fs::read_to_string(self.dir.path().join("args.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_owned)
        .collect()
    }
  }

  #[test]
  fn it_derives_publish_path() {
    assert_eq!(publish_s3_path("demo", Path::new("/var/log/run.log")), "demo/run.log");
  }

  #[test]
  fn it_builds_eks_arguments() {
    let fixture = Fixture::new("ACTIVE", "exit 0");
    let tester = fixture.tester(Duration::from_secs(10));
    let invocation = tester.invocation(&["create", "cluster"]);

    assert_eq!(invocation.program(), fixture.awstester.as_path());
    assert_eq!(
      invocation.args(),
      &[
        "eks".to_owned(),
        format!("--path={}", fixture.config_path.display()),
        "create".to_owned(),
        "cluster".to_owned(),
      ]
    );
    assert_eq!(invocation.name(), "create cluster");
  }

  #[tokio::test]
  async fn it_brings_cluster_up() {
    let fixture = Fixture::new("ACTIVE", "exit 0");
    let mut tester = fixture.tester(Duration::from_secs(10));

    tester.up().await.unwrap();
    assert_eq!(
      fixture.calls(),
      vec![format!("eks --path={} create cluster", fixture.config_path.display())]
    );
  }

  #[tokio::test]
  async fn it_times_out_bringing_cluster_up() {
    let fixture = Fixture::new("ACTIVE", "exec sleep 2");
    let mut tester = fixture.tester(Duration::from_millis(200));

    let err = tester.up().await.unwrap_err();
    assert!(matches!(err, Error::TimedOut { .. }));
  }

  #[tokio::test]
  async fn it_interrupts_bringing_cluster_up() {
    let fixture = Fixture::new("ACTIVE", "exec sleep 30");
    let mut tester = fixture.tester(Duration::from_secs(60));

    let stop = tester.control().stop_signal().clone();
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(200)).await;
      stop.request_stop();
    });

    let started = Instant::now();
    let err = tester.up().await.unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(
      err.to_string(),
      "'create cluster' command interrupted (interrupt error <nil>)"
    );
  }

  #[tokio::test]
  async fn it_does_not_run_after_stop() {
    let fixture = Fixture::new("ACTIVE", "exit 0");
    let mut tester = fixture.tester(Duration::from_secs(10));
    tester.stop();
    tester.stop();

    let err = tester.down().await.unwrap_err();
    assert!(matches!(err, Error::Interrupted { interrupt: None, .. }));
    assert_eq!(err.to_string(), "'delete cluster' command interrupted (not started)");
    assert!(fixture.calls().is_empty());
  }

  #[tokio::test]
  async fn it_propagates_tear_down_failure() {
    let fixture = Fixture::new("ACTIVE", "echo 'cluster not found'\nexit 1");
    let mut tester = fixture.tester(Duration::from_secs(10));

    let err = tester.down().await.unwrap_err();
    assert!(matches!(err, Error::NonZeroExit { .. }));
    assert_eq!(err.output(), Some("cluster not found\n"));
  }

  #[tokio::test]
  async fn it_checks_active_cluster() {
    let fixture = Fixture::new("ACTIVE", "exit 0");
    let mut tester = fixture.tester(Duration::from_secs(10));

    tester.is_up().await.unwrap();
    tester.test_setup().await.unwrap();
  }

  #[rstest]
  #[case("CREATING")]
  #[case("DELETING")]
  #[case("active")]
  #[case("")]
  #[tokio::test]
  async fn it_rejects_inactive_cluster(#[case] status: &str) {
    let fixture = Fixture::new(status, "exit 0");
    let mut tester = fixture.tester(Duration::from_secs(10));

    match tester.is_up().await {
      Err(Error::StateMismatch { cluster, status: got }) => {
        assert_eq!(cluster, "demo");
        assert_eq!(got, status);
      }
      other => panic!("unexpected result {other:?}"),
    }
  }

  #[tokio::test]
  async fn it_reloads_state_written_by_check() {
    let fixture = Fixture::new("CREATING", "");
    // The stub rewrites the config the way `awstester check cluster` does
    let body = format!("sed -i 's/CREATING/ACTIVE/' {}", fixture.config_path.display());
    fs::write(&fixture.awstester, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut tester = fixture.tester(Duration::from_secs(10));

    tester.is_up().await.unwrap();
    assert!(tester.config().is_active());
  }

  #[tokio::test]
  async fn it_fails_check_when_config_is_gone() {
    let fixture = Fixture::new("ACTIVE", "exit 0");
    let mut tester = fixture.tester(Duration::from_secs(10));
    fs::remove_file(&fixture.config_path).unwrap();

    assert!(matches!(tester.is_up().await, Err(Error::ReloadFailed { .. })));
  }

  #[tokio::test]
  async fn it_gets_cluster_created() {
    let fixture = Fixture::new("ACTIVE", "exit 0");
    let mut tester = fixture.tester(Duration::from_secs(10));

    let created = tester.get_cluster_created().await.unwrap().unwrap();
    assert_eq!(created.to_rfc3339(), "2018-11-29T21:42:33+00:00");
  }

  #[tokio::test]
  async fn it_does_not_get_created_of_inactive_cluster() {
    let fixture = Fixture::new("DELETING", "exit 0");
    let mut tester = fixture.tester(Duration::from_secs(10));

    assert!(matches!(
      tester.get_cluster_created().await,
      Err(Error::StateMismatch { .. })
    ));
  }

  #[tokio::test]
  async fn it_dumps_cluster_logs() {
    let fixture = Fixture::new("ACTIVE", "exit 0");
    let mut tester = fixture.tester(Duration::from_secs(10));

    tester
      .dump_cluster_logs(Path::new("/tmp/logs"), "demo/logs")
      .await
      .unwrap();
    assert_eq!(
      fixture.calls(),
      vec![format!(
        "eks --path={} s3-upload /tmp/logs demo/logs",
        fixture.config_path.display()
      )]
    );
  }

  #[tokio::test]
  async fn it_publishes_log_output() {
    let fixture = Fixture::new("ACTIVE", "exit 0");
    let mut tester = fixture.tester(Duration::from_secs(10));

    tester.publish().await.unwrap();
    assert_eq!(
      fixture.calls(),
      vec![format!(
        "eks --path={} s3-upload /var/log/run.log demo/run.log",
        fixture.config_path.display()
      )]
    );
  }

  #[rstest]
  #[case(AlbTest::Correctness, "correctness")]
  #[case(AlbTest::Qps, "qps")]
  #[case(AlbTest::Metrics, "metrics")]
  #[tokio::test]
  async fn it_runs_alb_tests(#[case] test: AlbTest, #[case] name: &str) {
    let fixture = Fixture::new("ACTIVE", "exit 0");
    let mut tester = fixture.tester(Duration::from_secs(10));

    tester.test_alb(test).await.unwrap();
    assert_eq!(
      fixture.calls(),
      vec![format!(
        "eks --path={} test alb {name}",
        fixture.config_path.display()
      )]
    );
  }

  #[tokio::test]
  async fn it_reloads_config_before_subtest() {
    let fixture = Fixture::new("ACTIVE", "exit 0");
    let mut tester = fixture.tester(Duration::from_secs(10));
    fs::remove_file(&fixture.config_path).unwrap();

    assert!(matches!(
      tester.test_alb_correctness().await,
      Err(Error::ReloadFailed { .. })
    ));
    assert!(fixture.calls().is_empty());
  }
}
