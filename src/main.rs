use clap::{Parser, Subcommand, ValueEnum};
use quire::build::{self, BuildEvent, BuildOptions};
use quire::collection::CollectionKey;
use quire::config::{self, SiteConfig};
use quire::output;
use quire::server::PreviewServer;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quire")]
#[command(version)]
#[command(about = "Static site generator for blogs")]
#[command(long_about = "\
Static site generator for blogs

Markdown files with YAML front-matter become HTML pages. Posts live in
source/_posts/ and are grouped into the home listing, archives, tags and
categories. Everything else under source/ is a page, or an asset copied
through as-is. Files and directories starting with _ or . are ignored.

Site layout:

  _config.yml           # Site config (optional)
  source/
  ├── _posts/           # Posts (dated, listed, tagged)
  ├── _drafts/          # Drafts (built only with render_drafts: true)
  ├── about/index.md    # Page → /about/
  └── css/extra.css     # Asset → /css/extra.css
  public/               # Generated site

Run 'quire gen-config' to print a documented _config.yml.")]
struct Cli {
    /// Site root directory
    #[arg(long, default_value = ".", global = true)]
    cwd: PathBuf,

    /// Config files merged in order, relative to the site root
    #[arg(long, value_delimiter = ',', global = true)]
    config: Vec<PathBuf>,

    /// Log progress details
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render the site into the public directory
    #[command(visible_aliases = ["build", "g"])]
    Generate {
        /// Ignore the build cache and render every document
        #[arg(long)]
        force: bool,
    },
    /// Build the site, then serve the public directory
    Server {
        #[arg(long, default_value = "127.0.0.1")]
        ip: String,
        #[arg(short, long, default_value_t = 4000)]
        port: u16,
        /// Serve the existing public directory without building
        #[arg(short = 's', long = "static")]
        static_only: bool,
    },
    /// Remove the public directory and the build cache
    Clean,
    /// List site content without building
    List {
        #[arg(value_enum)]
        kind: ListKind,
    },
    /// Print a stock _config.yml with all options documented
    GenConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum ListKind {
    Post,
    Page,
    Tag,
    Category,
    Route,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let site_root = cli.cwd.as_path();
    let load = || config::load_config(site_root, &cli.config);

    match cli.command {
        Command::Generate { force } => {
            generate(site_root, &load()?, force)?;
        }
        Command::Server {
            ip,
            port,
            static_only,
        } => {
            let site_config = load()?;
            if !static_only {
                generate(site_root, &site_config, false)?;
            }
            let public = site_config.public_path(site_root);
            let server = PreviewServer::bind(&ip, port, public, site_config.root.clone())?;
            println!(
                "Serving {} at http://{}{}",
                site_config.public_dir,
                server.addr(),
                site_config.root
            );
            println!("Press Ctrl+C to stop.");
            server.run();
        }
        Command::Clean => {
            let removed = build::clean(site_root, &load()?)?;
            if removed.is_empty() {
                println!("Nothing to clean");
            }
            for path in removed {
                println!("Removed {}", path.display());
            }
        }
        Command::List { kind } => {
            let site_config = load()?;
            let index = build::index_site(site_root, &site_config)?;
            let lines = match kind {
                ListKind::Post => output::format_posts(&index, &site_config),
                ListKind::Page => output::format_pages(&index, &site_config),
                ListKind::Tag => output::format_terms(
                    "Tags",
                    &index.collections,
                    |key| matches!(key, CollectionKey::Tag(_)),
                    &site_config,
                ),
                ListKind::Category => output::format_terms(
                    "Categories",
                    &index.collections,
                    |key| matches!(key, CollectionKey::Category(_)),
                    &site_config,
                ),
                ListKind::Route => output::format_routes(&index.routes, &site_config),
            };
            output::print_lines(lines);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_yaml());
        }
    }

    Ok(())
}

/// Run a build, streaming progress lines while documents render.
fn generate(
    site_root: &Path,
    site_config: &SiteConfig,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    init_thread_pool(site_config);
    let (tx, rx) = mpsc::channel::<BuildEvent>();
    let printer = std::thread::spawn(move || {
        for event in rx {
            output::print_build_event(&event);
        }
    });
    let result = build::build(site_root, site_config, &BuildOptions { force }, Some(tx));
    printer
        .join()
        .map_err(|_| "progress printer thread panicked")?;
    let report = result?;
    output::print_build_report(&report, Path::new(&site_config.public_dir));
    Ok(())
}

/// `--verbose` shows info-level logs; otherwise `RUST_LOG` decides, warn by default.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on `max_workers`.
///
/// Caps at the number of available CPU cores: workers can be constrained down, not up.
fn init_thread_pool(site_config: &SiteConfig) {
    let threads = config::effective_threads(site_config.max_workers);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
