use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use pack_container::{read_pack, write_atomically, PackFile};
use resource_core::codec;
use resource_core::file_system::PackFileSystemManager;
use resource_core::loader::FileByteLoader;
use resource_core::logging::{self, LogLevel};
use resource_core::manifest::{LocalManifest, RemoteManifest};
use resource_core::scan;
use resource_core::settings::CheckerSettings;
use resource_core::{
    CheckContext, CheckEvents, CheckError, LoadType, ResourceChecker, ResourceTables,
};

const EXIT_SUCCESS: i32 = 0;
const EXIT_USAGE: i32 = 2;
const EXIT_SETTINGS: i32 = 10;
const EXIT_MANIFEST: i32 = 11;
const EXIT_CHECK: i32 = 12;
const EXIT_CONTAINER: i32 = 13;

#[derive(Parser)]
#[command(name = "tools", version, about = "Resource checker tools CLI")]
struct Cli {
    #[arg(long, global = true, default_value = "info", value_name = "LEVEL")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one check cycle against the configured manifests.
    Check(CheckArgs),
    Manifest(ManifestArgs),
    Pack(PackArgs),
}

#[derive(Parser)]
struct CheckArgs {
    #[arg(long, value_name = "PATH")]
    settings: PathBuf,

    #[arg(long)]
    variant: Option<String>,

    #[arg(long)]
    ignore_other_variant: bool,
}

#[derive(Parser)]
struct ManifestArgs {
    #[command(subcommand)]
    command: ManifestCommand,
}

#[derive(Subcommand)]
enum ManifestCommand {
    Dump {
        #[arg(long, value_name = "PATH", conflicts_with = "local", required_unless_present = "local")]
        remote: Option<PathBuf>,
        #[arg(long, value_name = "PATH")]
        local: Option<PathBuf>,
    },
    /// Describe the loose files below a directory as a local manifest.
    Scan {
        #[arg(long, value_name = "DIR")]
        dir: PathBuf,
        #[arg(long, value_name = "PATH")]
        out: PathBuf,
    },
}

#[derive(Parser)]
struct PackArgs {
    #[command(subcommand)]
    command: PackCommand,
}

#[derive(Subcommand)]
enum PackCommand {
    List {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    Extract {
        #[arg(value_name = "PATH")]
        path: PathBuf,
        #[arg(long, value_name = "DIR")]
        out: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    let level = match cli.log_level.parse::<LogLevel>() {
        Ok(level) => level,
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(EXIT_USAGE);
        }
    };
    logging::init(level);
    let exit_code = match cli.command {
        Commands::Check(args) => run_check(args),
        Commands::Manifest(args) => run_manifest(args),
        Commands::Pack(args) => run_pack(args),
    };
    std::process::exit(exit_code);
}

fn run_check(args: CheckArgs) -> i32 {
    let settings = match CheckerSettings::load(&args.settings) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("{}", err);
            return EXIT_SETTINGS;
        }
    };
    let validation = settings.validate();
    for warning in &validation.warnings {
        eprintln!("settings warning: {}", warning);
    }
    if !validation.is_ok() {
        for error in &validation.errors {
            eprintln!("settings error: {}", error);
        }
        return EXIT_SETTINGS;
    }
    let options = match settings.checker_options() {
        Ok(options) => options,
        Err(err) => {
            eprintln!("{}", err);
            return EXIT_SETTINGS;
        }
    };
    let mut file_systems =
        match PackFileSystemManager::new(&settings.read_write_root, &settings.container_extension) {
            Ok(manager) => manager,
            Err(err) => {
                eprintln!("container scan failed: {}", err);
                return EXIT_CONTAINER;
            }
        };

    let variant = args.variant.or(settings.current_variant.clone());
    let ignore_other_variant = args.ignore_other_variant || settings.ignore_other_variant;
    let loader = FileByteLoader::inline();
    let mut checker = ResourceChecker::new(options);
    let mut tables = ResourceTables::new();
    let mut events = CheckEvents::default();

    let result = checker
        .check_resources(&loader, variant.as_deref(), ignore_other_variant)
        .and_then(|()| {
            let mut ctx = CheckContext {
                file_systems: &mut file_systems,
                tables: &mut tables,
                listener: &mut events,
            };
            checker.pump(&mut ctx)
        });
    let summary = match result {
        Ok(Some(summary)) => summary,
        Ok(None) => {
            eprintln!("check cycle did not complete");
            return EXIT_CHECK;
        }
        Err(err) => {
            eprintln!("check failed: {}", err);
            return match err {
                CheckError::ManifestCorrupt { .. } => EXIT_MANIFEST,
                CheckError::MigrationFailure { .. } => EXIT_CONTAINER,
                _ => EXIT_CHECK,
            };
        }
    };

    for update in &events.updates {
        println!(
            "update {} container={} load={} length={} compressed={}",
            update.name,
            update.container_name.as_deref().unwrap_or("-"),
            update.load_type,
            update.length,
            update.compressed_length
        );
    }
    println!(
        "check ok (version={} internal={}): moved={} removed={} updates={} bytes={} compressed={}",
        tables.applicable_game_version,
        tables.internal_resource_version,
        summary.moved,
        summary.removed,
        summary.update_count,
        summary.update_total_length,
        summary.update_total_compressed_length
    );
    EXIT_SUCCESS
}

fn run_manifest(args: ManifestArgs) -> i32 {
    match args.command {
        ManifestCommand::Dump { remote, local } => match (remote, local) {
            (Some(path), None) => dump_remote(&path),
            (None, Some(path)) => dump_local(&path),
            _ => {
                eprintln!("exactly one of --remote or --local is required");
                EXIT_USAGE
            }
        },
        ManifestCommand::Scan { dir, out } => scan_dir(&dir, &out),
    }
}

fn read_manifest_bytes(path: &Path) -> Result<Vec<u8>, i32> {
    std::fs::read(path).map_err(|err| {
        eprintln!("manifest read failed ({}): {}", path.display(), err);
        EXIT_MANIFEST
    })
}

fn dump_remote(path: &Path) -> i32 {
    let decoded = read_manifest_bytes(path).map(|bytes| codec::decode_remote(&bytes));
    let manifest: RemoteManifest = match decoded {
        Ok(Ok(manifest)) => manifest,
        Ok(Err(err)) => {
            eprintln!("remote manifest decode failed: {}", err);
            return EXIT_MANIFEST;
        }
        Err(code) => return code,
    };

    println!(
        "remote manifest: version={} internal={} assets={} resources={} containers={} groups={}",
        manifest.applicable_game_version(),
        manifest.internal_resource_version(),
        manifest.assets().len(),
        manifest.resources().len(),
        manifest.containers().len(),
        manifest.resource_groups().len()
    );
    for (id, resource) in manifest.resource_entries() {
        println!(
            "{:>10} {:>10} {:08x} {:<22} {} [{}] assets={}",
            resource.length,
            resource.compressed_length,
            resource.hash,
            resource.load_type.as_str(),
            resource.name,
            manifest.container_of(id).unwrap_or("-"),
            resource.assets.len()
        );
    }
    for group in manifest.resource_groups() {
        println!("group {} ({} resources)", group.name, group.resources.len());
    }
    EXIT_SUCCESS
}

fn dump_local(path: &Path) -> i32 {
    let decoded = read_manifest_bytes(path).map(|bytes| codec::decode_local(&bytes));
    let manifest: LocalManifest = match decoded {
        Ok(Ok(manifest)) => manifest,
        Ok(Err(err)) => {
            eprintln!("local manifest decode failed: {}", err);
            return EXIT_MANIFEST;
        }
        Err(code) => return code,
    };

    println!(
        "local manifest: resources={} containers={}",
        manifest.resources().len(),
        manifest.containers().len()
    );
    for (id, resource) in manifest.resource_entries() {
        println!(
            "{:>10} {:08x} {:<22} {} [{}]",
            resource.length,
            resource.hash,
            resource.load_type.as_str(),
            resource.name,
            manifest.container_of(id).unwrap_or("-")
        );
    }
    EXIT_SUCCESS
}

fn scan_dir(dir: &Path, out: &Path) -> i32 {
    if !dir.is_dir() {
        eprintln!("scan dir not found: {}", dir.display());
        return EXIT_USAGE;
    }
    let manifest = match scan::scan_loose_files(dir, LoadType::LoadFromFile, &[out.to_path_buf()]) {
        Ok(manifest) => manifest,
        Err(err) => {
            eprintln!("scan failed: {}", err);
            return EXIT_MANIFEST;
        }
    };
    let bytes = match codec::encode_local(&manifest) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("manifest encode failed: {}", err);
            return EXIT_MANIFEST;
        }
    };
    if let Err(err) = write_atomically(out, &bytes) {
        eprintln!("manifest write failed ({}): {}", out.display(), err);
        return EXIT_MANIFEST;
    }
    println!(
        "wrote {} resources to {}",
        manifest.resources().len(),
        out.display()
    );
    EXIT_SUCCESS
}

fn run_pack(args: PackArgs) -> i32 {
    match args.command {
        PackCommand::List { path } => pack_list(&path),
        PackCommand::Extract { path, out } => pack_extract(&path, &out),
    }
}

fn pack_list(path: &Path) -> i32 {
    let pack = match load_pack(path) {
        Ok(pack) => pack,
        Err(code) => return code,
    };

    println!("pack: {}", path.display());
    for entry in pack.entries() {
        println!("{:>10} {:>10} {}", entry.offset, entry.size, entry.name);
    }
    EXIT_SUCCESS
}

fn pack_extract(path: &Path, out_dir: &Path) -> i32 {
    let pack = match load_pack(path) {
        Ok(pack) => pack,
        Err(code) => return code,
    };

    if let Err(err) = pack.extract_all(out_dir) {
        eprintln!("pack extract failed: {}", err);
        return EXIT_CONTAINER;
    }

    println!("extracted {} entries to {}", pack.entries().len(), out_dir.display());
    EXIT_SUCCESS
}

fn load_pack(path: &Path) -> Result<PackFile, i32> {
    if !path.is_file() {
        eprintln!("pack not found: {}", path.display());
        return Err(EXIT_USAGE);
    }
    read_pack(path).map_err(|err| {
        eprintln!("pack parse failed: {}", err);
        EXIT_CONTAINER
    })
}
