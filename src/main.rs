//! absync: upload the files of local directories into an Azure Blob Storage
//! container, skipping every file whose content is already there.

use absync_config::{Config, locate};
use absync_storage::backend::{AzureBackend, DryRunStore};
use absync_storage::{StoreHandle, validate_container};
use absync_sync::{CommitPolicy, SyncContext, SyncReport, sync};
use clap::Parser;
use derive_more::{Display, Error};
use exn::ResultExt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "absync", version, about = "Sync local directories into an Azure Blob Storage container")]
#[command(long_about = r#"
Uploads every file of the given directories (not recursively) into a blob
container. Files whose MD5 digest matches the blob of the same name are
skipped; files over 256 MiB are uploaded in 50 MiB blocks.

Credentials are read from ABS_ACCOUNT_NAME and ABS_ACCOUNT_KEY, or from the
configuration file.
"#)]
struct Cli {
    /// Directories to upload from; comma-separated lists are accepted
    #[arg(value_name = "DIR", value_delimiter = ',')]
    dirs: Vec<PathBuf>,

    /// More directories to upload from
    #[arg(long = "dir", value_name = "DIR", value_delimiter = ',')]
    extra_dirs: Vec<PathBuf>,

    /// Destination container [default: "default"]
    #[arg(short, long)]
    container: Option<String>,

    /// Configuration file (toml, yaml or json)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// What a failed block list commit does: abort the run or only warn
    #[arg(long, value_name = "POLICY", value_parser = parse_commit_policy)]
    commit: Option<CommitPolicy>,

    /// List and compare as usual, but only log the writes
    #[arg(long)]
    dry_run: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}
impl Cli {
    /// Source directories in the order given; the current directory if none.
    fn source_dirs(&self) -> Vec<PathBuf> {
        let dirs: Vec<PathBuf> =
            self.dirs.iter().chain(&self.extra_dirs).filter(|dir| !dir.as_os_str().is_empty()).cloned().collect();
        if dirs.is_empty() { vec![PathBuf::from(".")] } else { dirs }
    }
}

fn parse_commit_policy(value: &str) -> Result<CommitPolicy, String> {
    value.parse().map_err(|err: absync_sync::error::Error| format!("{}", &*err))
}

#[derive(Debug, Display, Error)]
enum AppErrorKind {
    #[display("configuration error")]
    Config,
    #[display("could not set up the blob store")]
    Store,
    #[display("sync failed")]
    Sync,
}

type AppResult<T> = Result<T, exn::Exn<AppErrorKind>>;

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "absync=debug,info" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();
}

async fn run(cli: &Cli) -> AppResult<SyncReport> {
    // Everything configuration related fails before any request is made.
    let settings = Config::load(locate(cli.config.clone()).as_deref())
        .or_raise(|| AppErrorKind::Config)?
        .with_overrides(cli.container.clone(), cli.commit)
        .resolve()
        .or_raise(|| AppErrorKind::Config)?;
    validate_container(&settings.container).or_raise(|| AppErrorKind::Config)?;

    let credentials = &settings.credentials;
    let backend = AzureBackend::new(&credentials.account_name, &credentials.account_key, settings.endpoint.as_deref())
        .or_raise(|| AppErrorKind::Store)?;
    let mut store: StoreHandle = Arc::new(backend);
    if cli.dry_run {
        tracing::info!("Dry run: no container, blob or block will be written");
        store = Arc::new(DryRunStore::new(store));
    }

    let dirs = cli.source_dirs();
    tracing::info!(
        account = credentials.account_name.as_str(),
        container = settings.container.as_str(),
        commit = %settings.commit,
        dirs = ?dirs,
        "Syncing"
    );
    let ctx = SyncContext::new(store, settings.container).with_commit_policy(settings.commit);
    sync(&ctx, &dirs).await.or_raise(|| AppErrorKind::Sync)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli).await {
        Ok(report) => {
            tracing::info!(
                files = report.files,
                skipped = report.skipped,
                uploaded_whole = report.uploaded_whole,
                uploaded_chunked = report.uploaded_chunked,
                blocks = report.blocks,
                bytes = report.bytes,
                "Sync complete"
            );
            if report.failed_commits > 0 {
                tracing::warn!(failed_commits = report.failed_commits, "Some block lists were not committed");
            }
            ExitCode::SUCCESS
        },
        Err(err) => {
            eprintln!("{err:?}");
            ExitCode::FAILURE
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("absync").chain(args.iter().copied())).unwrap()
    }

    #[rstest]
    #[case(&[], &["."])]
    #[case(&["photos"], &["photos"])]
    #[case(&["photos,music"], &["photos", "music"])]
    #[case(&["photos", "--dir", "music,videos"], &["photos", "music", "videos"])]
    #[case(&["--dir", "a,b", "c"], &["c", "a", "b"])]
    fn test_source_dirs(#[case] args: &[&str], #[case] expected: &[&str]) {
        let expected: Vec<PathBuf> = expected.iter().map(PathBuf::from).collect();
        assert_eq!(parse(args).source_dirs(), expected);
    }

    #[test]
    fn test_flags() {
        let cli =
            parse(&["--container", "backups", "--commit", "legacy", "--dry-run", "-v", "--config", "absync.yaml"]);
        assert_eq!(cli.container.as_deref(), Some("backups"));
        assert_eq!(cli.commit, Some(CommitPolicy::Legacy));
        assert!(cli.dry_run);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("absync.yaml")));
    }

    #[test]
    fn test_unknown_commit_policy_rejected() {
        let result = Cli::try_parse_from(["absync", "--commit", "sometimes"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
