// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use gitplane::{
    config::{Settings, DEFAULT_BRANCH},
    path::{default_config_file, default_store_dir},
    publish::{
        artifacts::{ArtifactSource, DirectoryArtifacts, EmbeddedArtifacts},
        bundle::BUNDLE_TYPE_LABEL,
        root::Application,
    },
    store::{FsStore, LabelSelector, ObjectStore},
    DeployOutcome, DeployRequest, Publisher, RepoCoordinates,
};

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use futures::future::try_join;
use indicatif::ProgressBar;
use std::{fs::write, path::PathBuf, process::exit, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type AppPublisher = Publisher<FsStore, Box<dyn ArtifactSource>>;

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  gitplane [options] <gitplane-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to configuration file.
    #[arg(long, global = true, value_name = "file")]
    pub config: Option<PathBuf>,

    /// Path to record store directory.
    #[arg(long, global = true, value_name = "dir")]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<()> {
        let config = match self.config {
            Some(path) => path,
            None => default_config_file()?,
        };
        let settings = Settings::load(config)?;
        let store = match self.store.or_else(|| settings.store.clone()) {
            Some(path) => path,
            None => default_store_dir()?,
        };
        let publisher = Publisher::new(
            FsStore::open(store),
            artifact_source(&settings),
            settings.namespaces.clone(),
        );

        match self.command {
            Command::Cluster(ClusterCommand::Deploy(opts)) => {
                run_deploy(publisher, &settings, opts)
            }
            Command::Cluster(ClusterCommand::Root(opts)) => run_root(publisher, &settings, opts),
            Command::Cluster(ClusterCommand::Publish(opts)) => {
                run_publish(publisher, &settings, opts).await
            }
            Command::Bundle(BundleCommand::List) => run_bundle_list(publisher),
            Command::Bundle(BundleCommand::Delete(opts)) => run_bundle_delete(publisher, opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Publish cluster configuration.
    #[command(subcommand)]
    Cluster(ClusterCommand),

    /// Manage bundle records.
    #[command(subcommand)]
    Bundle(BundleCommand),
}

#[derive(Debug, Clone, Subcommand)]
enum ClusterCommand {
    /// Publish cluster tree into repository.
    #[command(override_usage = "gitplane cluster deploy [options] <cluster_name>")]
    Deploy(DeployOptions),

    /// Build root application of cluster.
    #[command(override_usage = "gitplane cluster root [options] <cluster_name>")]
    Root(RootOptions),

    /// Publish cluster tree and build its root application together.
    #[command(override_usage = "gitplane cluster publish [options] <cluster_name>")]
    Publish(PublishOptions),
}

#[derive(Debug, Clone, Subcommand)]
enum BundleCommand {
    /// List bundle records with their type.
    List,

    /// Remove bundle record.
    #[command(override_usage = "gitplane bundle delete <bundle_name>...")]
    Delete(DeleteOptions),
}

#[derive(Args, Clone, Debug)]
struct RepoOptions {
    /// URL of repository to publish into.
    #[arg(long, value_name = "url")]
    pub repo_url: Option<String>,

    /// Branch of repository to publish into.
    #[arg(long, value_name = "branch")]
    pub repo_branch: Option<String>,

    /// Directory inside repository holding cluster trees.
    #[arg(long, value_name = "path")]
    pub repo_path: Option<String>,
}

impl RepoOptions {
    fn resolve(self, settings: &Settings) -> Result<RepoCoordinates> {
        let defaults = settings.repository.clone().unwrap_or_default();
        let url = self.repo_url.or(defaults.url).ok_or_else(|| {
            anyhow!("no repository URL given, use --repo-url or set repository.url")
        })?;

        Ok(RepoCoordinates {
            url,
            branch: self
                .repo_branch
                .or(defaults.branch)
                .unwrap_or_else(|| DEFAULT_BRANCH.into()),
            base_path: self.repo_path.or(defaults.base_path).unwrap_or_default(),
        })
    }
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct DeployOptions {
    /// Name of cluster to publish.
    #[arg(required = true, value_name = "cluster_name")]
    pub cluster_name: String,

    #[command(flatten)]
    pub repo: RepoOptions,

    /// Profile naming bundles to publish with the cluster.
    #[arg(short, long, value_name = "profile", default_value = "")]
    pub profile: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RootOptions {
    /// Name of cluster to build root application of.
    #[arg(required = true, value_name = "cluster_name")]
    pub cluster_name: String,

    #[command(flatten)]
    pub repo: RepoOptions,

    /// Cluster specification holding sizing parameters.
    #[arg(short, long, required = true, value_name = "name")]
    pub cluster_spec: String,

    /// Write root application to file instead of stdout.
    #[arg(short, long, value_name = "file")]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct PublishOptions {
    /// Name of cluster to publish.
    #[arg(required = true, value_name = "cluster_name")]
    pub cluster_name: String,

    #[command(flatten)]
    pub repo: RepoOptions,

    /// Profile naming bundles to publish with the cluster.
    #[arg(short, long, value_name = "profile", default_value = "")]
    pub profile: String,

    /// Cluster specification holding sizing parameters.
    #[arg(short, long, required = true, value_name = "name")]
    pub cluster_spec: String,

    /// Write root application to file instead of stdout.
    #[arg(short, long, value_name = "file")]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct DeleteOptions {
    /// Names of bundles to remove.
    #[arg(required = true, value_name = "bundle_name")]
    pub bundle_names: Vec<String>,
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = match EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info")) {
        Ok(filter) => filter,
        Err(error) => {
            eprintln!("invalid log filter: {error}");
            exit(1);
        }
    };
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run().await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run() -> Result<()> {
    Cli::parse().run().await
}

fn artifact_source(settings: &Settings) -> Box<dyn ArtifactSource> {
    match &settings.artifacts {
        Some(dir) => Box::new(DirectoryArtifacts::new(dir)),
        None => Box::new(EmbeddedArtifacts),
    }
}

fn run_deploy(publisher: AppPublisher, settings: &Settings, opts: DeployOptions) -> Result<()> {
    let request = DeployRequest {
        cluster_name: opts.cluster_name,
        repo: opts.repo.resolve(settings)?,
        profile: opts.profile,
    };
    let outcome = publisher.deploy(&request, &ProgressBar::no_length())?;
    report_outcome(&request.cluster_name, outcome);

    Ok(())
}

fn run_root(publisher: AppPublisher, settings: &Settings, opts: RootOptions) -> Result<()> {
    let repo = opts.repo.resolve(settings)?;
    let app = publisher.root_application(&opts.cluster_name, &repo, &opts.cluster_spec)?;
    write_application(&app, opts.output)
}

async fn run_publish(
    publisher: AppPublisher,
    settings: &Settings,
    opts: PublishOptions,
) -> Result<()> {
    let publisher = Arc::new(publisher);
    let repo = opts.repo.resolve(settings)?;
    let request = DeployRequest {
        cluster_name: opts.cluster_name.clone(),
        repo: repo.clone(),
        profile: opts.profile,
    };

    let deploy = {
        let publisher = publisher.clone();
        tokio::task::spawn_blocking(move || {
            publisher.deploy(&request, &ProgressBar::no_length())
        })
    };
    let root = {
        let publisher = publisher.clone();
        let cluster_name = opts.cluster_name.clone();
        let cluster_spec = opts.cluster_spec;
        tokio::task::spawn_blocking(move || {
            publisher.root_application(&cluster_name, &repo, &cluster_spec)
        })
    };

    // INVARIANT: Only emit root application if the deploy succeeded too.
    let (outcome, app) = try_join(
        async { anyhow::Ok(deploy.await??) },
        async { anyhow::Ok(root.await??) },
    )
    .await?;
    report_outcome(&opts.cluster_name, outcome);
    write_application(&app, opts.output)
}

fn run_bundle_list(publisher: AppPublisher) -> Result<()> {
    let selector = LabelSelector::new().with_exists(BUNDLE_TYPE_LABEL);
    let bundles = publisher
        .store()
        .list_secrets(&publisher.namespaces().records, &selector)?;
    for bundle in bundles {
        println!(
            "{}\t{}",
            bundle.name,
            bundle.label(BUNDLE_TYPE_LABEL).unwrap_or_default()
        );
    }

    Ok(())
}

fn run_bundle_delete(publisher: AppPublisher, opts: DeleteOptions) -> Result<()> {
    let namespace = &publisher.namespaces().records;
    for bundle_name in opts.bundle_names {
        publisher.store().delete_secret(namespace, &bundle_name)?;
        info!("deleted bundle {bundle_name}");
    }

    Ok(())
}

fn report_outcome(cluster_name: &str, outcome: DeployOutcome) {
    match outcome {
        DeployOutcome::Unchanged => info!("{cluster_name} is already up to date"),
        DeployOutcome::Pushed { commit } => info!("{cluster_name} published at {commit}"),
    }
}

fn write_application(app: &Application, output: Option<PathBuf>) -> Result<()> {
    let yaml = app.to_yaml()?;
    match output {
        Some(path) => {
            write(&path, yaml)?;
            info!("wrote root application to {:?}", path.display());
        }
        None => print!("{yaml}"),
    }

    Ok(())
}
