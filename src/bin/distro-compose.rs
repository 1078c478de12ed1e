use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

use distro_compose::blueprint::filesystems_of;
use distro_compose::distro::{Catalog, ImageTypeRef};
use distro_compose::request::{self, ComposeRequest, PackageSpecSets};

#[derive(Parser)]
#[command(name = "distro-compose", version, about = "Compile image requests into osbuild manifests")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List distributions, architectures and image types
    List {
        /// Only this distribution
        #[arg(long)]
        distro: Option<String>,
    },
    /// Print the package sets to depsolve for a request
    PackageSets(Target),
    /// Print the partition table a request would produce
    PartitionTable(Target),
    /// Compile a request into an osbuild manifest
    Manifest {
        #[command(flatten)]
        target: Target,
        /// Depsolved package specs (JSON, keyed by package set)
        #[arg(long)]
        package_specs: PathBuf,
        /// Write the manifest here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct Target {
    #[arg(long)]
    distro: String,
    #[arg(long)]
    arch: String,
    #[arg(long = "image-type")]
    image_type: String,
    /// Compose request (TOML); defaults apply when omitted
    #[arg(long)]
    request: Option<PathBuf>,
}

impl Target {
    fn resolve<'a>(&self, catalog: &'a Catalog) -> Result<ImageTypeRef<'a>> {
        let image_type = catalog
            .get_distro(&self.distro)?
            .get_arch(&self.arch)?
            .get_image_type(&self.image_type)?;
        Ok(image_type)
    }

    fn load_request(&self) -> Result<ComposeRequest> {
        match &self.request {
            Some(path) => request::load_request(path),
            None => Ok(ComposeRequest::default()),
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let catalog = Catalog::new().context("building distribution catalog")?;

    match cli.command {
        Command::List { distro } => list(&catalog, distro.as_deref()),
        Command::PackageSets(target) => package_sets(&catalog, &target),
        Command::PartitionTable(target) => partition_table(&catalog, &target),
        Command::Manifest {
            target,
            package_specs,
            output,
        } => manifest(&catalog, &target, &package_specs, output.as_deref()),
    }
}

fn list(catalog: &Catalog, only: Option<&str>) -> Result<()> {
    let names = match only {
        Some(name) => vec![name],
        None => catalog.list_distros(),
    };
    for name in names {
        let distro = catalog.get_distro(name)?;
        println!("{} ({} {})", distro.name, distro.product, distro.os_version);
        for arch_name in distro.list_arches() {
            let arch = distro.get_arch(arch_name)?;
            println!("  {}: {}", arch_name, arch.list_image_types().join(" "));
        }
    }
    Ok(())
}

fn package_sets(catalog: &Catalog, target: &Target) -> Result<()> {
    let image_type = target.resolve(catalog)?;
    let request = target.load_request()?;
    let sets = image_type
        .package_sets(&request.blueprint)
        .with_context(|| format!("resolving package sets for '{}'", image_type.name()))?;
    println!("{}", serde_json::to_string_pretty(&sets)?);
    Ok(())
}

fn partition_table(catalog: &Catalog, target: &Target) -> Result<()> {
    let image_type = target.resolve(catalog)?;
    let request = target.load_request()?;
    let mut rng = StdRng::seed_from_u64(request.seed);
    let pt = image_type
        .partition_table(
            filesystems_of(request.blueprint.customizations()),
            &request.options,
            &mut rng,
        )
        .with_context(|| format!("creating partition table for '{}'", image_type.name()))?;
    println!("{}", serde_json::to_string_pretty(&pt)?);
    Ok(())
}

fn manifest(
    catalog: &Catalog,
    target: &Target,
    package_specs: &Path,
    output: Option<&Path>,
) -> Result<()> {
    let image_type = target.resolve(catalog)?;
    let request = target.load_request()?;
    let specs: PackageSpecSets = request::load_package_specs(package_specs)?;

    let manifest = image_type
        .manifest(
            request.blueprint.customizations(),
            &request.options,
            &request.repositories,
            &specs,
            request.seed,
        )
        .with_context(|| format!("composing '{}' for {}", image_type.name(), target.arch))?;
    let json = manifest.to_json()?;

    match output {
        Some(path) => fs::write(path, json + "\n")
            .with_context(|| format!("writing manifest '{}'", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}
