//! Command-line surface.

use clap::{Args, Parser, Subcommand};
use releaseflow::config::RunOptions;
use releaseflow::core::RebuildPolicy;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "releaseflow")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Resumable release pipeline for remotely built component groups", long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Base URL of the build and release service
    #[arg(
        long,
        global = true,
        env = "RELEASEFLOW_SERVICE_URL",
        default_value = "http://localhost:8080/api/"
    )]
    pub service_url: String,

    /// Request timeout in seconds
    #[arg(long, global = true, default_value_t = 60)]
    pub timeout_secs: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run every stage, resuming from the last checkpoint
    Run(StageArgs),
    /// Register product, milestone and build configurations
    Configure(StageArgs),
    /// Build the component group
    Build(StageArgs),
    /// Generate the artifact repository
    Repo(StageArgs),
    /// Generate the license report
    Licenses(StageArgs),
    /// Generate the API documentation bundle
    Javadocs(StageArgs),
    /// Generate the source bundle
    Sources(StageArgs),
    /// Generate the shared-content analysis input
    SharedContent(StageArgs),
    /// Generate release documents
    Docs(StageArgs),
    /// Run the configured add-ons
    Addons(StageArgs),
    /// Promote the builds and close the milestone
    Release(StageArgs),
    /// Print the persisted progress of a release
    Status {
        /// Configuration directory
        #[arg(default_value = ".")]
        config: PathBuf,
    },
}

#[derive(Debug, Args)]
pub struct StageArgs {
    /// Configuration directory containing release.toml
    #[arg(default_value = ".")]
    pub config: PathBuf,

    #[command(flatten)]
    pub options: OptionArgs,
}

#[derive(Debug, Default, Args)]
#[allow(clippy::struct_excessive_bools)]
pub struct OptionArgs {
    /// Build temporary, non-promotable artifacts
    #[arg(long)]
    pub temp_build: bool,

    /// Suffix temporary build versions with a timestamp
    #[arg(long, requires = "temp_build")]
    pub temp_build_timestamp: bool,

    /// Rebuild policy: EXPLICIT_DEPENDENCY_CHECK, IMPLICIT_DEPENDENCY_CHECK or FORCE
    #[arg(long, default_value_t = RebuildPolicy::ExplicitDependencyCheck)]
    pub rebuild_mode: RebuildPolicy,

    /// Skip repository generation
    #[arg(long)]
    pub skip_repo: bool,

    /// Skip registering entities with the service
    #[arg(long)]
    pub skip_pnc_update: bool,

    /// Skip the build stage
    #[arg(long)]
    pub skip_builds: bool,

    /// Skip the source bundle
    #[arg(long)]
    pub skip_sources: bool,

    /// Skip the API documentation bundle
    #[arg(long)]
    pub skip_javadoc: bool,

    /// Skip the license report
    #[arg(long)]
    pub skip_licenses: bool,

    /// Skip the shared-content analysis
    #[arg(long)]
    pub skip_shared_content: bool,

    /// Stop before releasing
    #[arg(long)]
    pub skip_release: bool,

    /// Keep only the highest version of each artifact
    #[arg(long)]
    pub remove_generated_duplicates: bool,

    /// Do not check whether component sources moved
    #[arg(long)]
    pub skip_branch_check: bool,

    /// Discard the persisted context and start over
    #[arg(long)]
    pub clean: bool,

    /// Use a repository snapshot (directory or manifest) instead of the service
    #[arg(long)]
    pub repo_zip_path: Option<PathBuf>,

    /// Storage URL the upload script copies the release to
    #[arg(long)]
    pub release_storage_url: Option<String>,
}

impl OptionArgs {
    pub fn to_options(&self) -> RunOptions {
        RunOptions {
            temp_build: self.temp_build,
            temp_build_timestamp: self.temp_build_timestamp,
            rebuild_mode: self.rebuild_mode,
            skip_repo: self.skip_repo,
            skip_pnc_update: self.skip_pnc_update,
            skip_builds: self.skip_builds,
            skip_sources: self.skip_sources,
            skip_javadoc: self.skip_javadoc,
            skip_licenses: self.skip_licenses,
            skip_shared_content: self.skip_shared_content,
            skip_release: self.skip_release,
            remove_generated_duplicates: self.remove_generated_duplicates,
            skip_branch_check: self.skip_branch_check,
            clean: self.clean,
            repo_zip_path: self.repo_zip_path.clone(),
            release_storage_url: self.release_storage_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("releaseflow").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_run_flags_map_to_options() {
        let cli = parse(&[
            "run",
            "releases/widget",
            "--skip-javadoc",
            "--rebuild-mode",
            "force",
            "--release-storage-url",
            "rsync://storage/candidates",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        let options = args.options.to_options();

        assert_eq!(args.config, PathBuf::from("releases/widget"));
        assert!(options.skip_javadoc);
        assert_eq!(options.rebuild_mode, RebuildPolicy::Force);
        assert_eq!(
            options.release_storage_url.as_deref(),
            Some("rsync://storage/candidates")
        );
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["build"]);
        let Command::Build(args) = cli.command else {
            panic!("expected build");
        };

        assert_eq!(args.config, PathBuf::from("."));
        assert_eq!(args.options.to_options(), RunOptions::new());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_unknown_rebuild_mode_is_rejected() {
        let result = Cli::try_parse_from(["releaseflow", "build", "--rebuild-mode", "sometimes"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_timestamp_requires_temp_build() {
        let result = Cli::try_parse_from(["releaseflow", "build", "--temp-build-timestamp"]);
        assert!(result.is_err());
    }
}
