use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "loadtest-operator")]
#[command(about = "Kubernetes LoadTest operator and runner")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Display application version
    Version,

    /// Check cluster connectivity and permissions
    Check,

    /// List Kubernetes resources (e.g. pods)
    List {
        /// Resource type to list (pods)
        resource: String,
    },

    /// Manage the LoadTest CRD
    Crd {
        #[command(subcommand)]
        action: CrdAction,
    },

    /// Start the LoadTest operator reconcile loop
    Reconcile,

    /// Driver pod init container: wait for sibling workers to become reachable
    Ready {
        /// Name of the owning LoadTest
        loadtest_name: String,
        /// Namespace to look up the LoadTest and sibling pods in
        #[arg(long)]
        namespace: Option<String>,
    },

    /// Worker pod sidecar: serve the cleanup quit endpoint
    Cleanup {
        #[arg(long, default_value_t = 9091)]
        port: u16,
    },

    /// Drive a batch of LoadTest configs through the cluster and report results
    Run {
        /// Multi-document YAML file of LoadTest configs (repeatable)
        #[arg(short = 'i', long = "input", required = true)]
        input_files: Vec<std::path::PathBuf>,

        /// Per-queue concurrency as `[<queue>:]<n>` (repeatable)
        #[arg(short = 'c', long = "concurrency")]
        concurrency: Vec<String>,

        /// Annotation used to select the queue for a test
        #[arg(long = "annotation-key", default_value = "pool")]
        annotation_key: String,

        /// Polling interval while waiting for a test to terminate
        #[arg(long = "polling-interval", default_value = "20s")]
        polling_interval: String,

        /// Number of transient-error retries while polling a test
        #[arg(long = "polling-retries", default_value_t = 2)]
        polling_retries: u32,

        /// Output XML report path
        #[arg(short = 'o', long = "output")]
        output: Option<std::path::PathBuf>,

        /// Directory to write per-pod logs under as `<log-dir>/<test>/<pod>.log`
        #[arg(long = "log-dir")]
        log_dir: Option<std::path::PathBuf>,

        /// Delete successful tests immediately upon observed termination
        #[arg(long = "delete-successful-tests", default_value_t = false)]
        delete_successful_tests: bool,
    },
}

#[derive(Subcommand)]
pub enum CrdAction {
    /// Print the CRD YAML to stdout
    Generate,

    /// Install the CRD into the connected cluster
    Install,
}
