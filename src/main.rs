//! Instancer CLI - replace duplicate polygon objects in a JSON scene with instances.

use instancer::grouper::Groups;
use instancer::prelude::{Config, Instancer, LogProgress, MeshView, NodeId, ProgressSink, Scene, SceneHost};
use std::env;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Verbosity levels
const LOG_QUIET: u8 = 0;
const LOG_INFO: u8 = 1;
const LOG_DEBUG: u8 = 2;
const LOG_TRACE: u8 = 3;

/// `INSTANCER_LOG` wins over the command line flags.
fn init_logging(level: u8) {
    let fallback = match level {
        LOG_QUIET => "error",
        LOG_INFO => "instancer=info",
        LOG_DEBUG => "instancer=debug",
        _ => "instancer=trace",
    };
    let filter = EnvFilter::try_from_env("INSTANCER_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(level >= LOG_TRACE))
        .with(filter)
        .init();
}

/// Options shared by `run` and `groups`.
#[derive(Debug, Default)]
struct Options {
    config: Config,
    output: Option<String>,
    inputs: Vec<String>,
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<&&str>) -> Result<T, String> {
    let value = value.ok_or_else(|| format!("{} needs a value", flag))?;
    value.parse().map_err(|_| format!("Invalid value for {}: {}", flag, value))
}

fn parse_options(args: &[&str]) -> Result<Options, String> {
    // --config is applied first so the other flags override the file
    let mut config = match args.iter().position(|a| *a == "--config" || *a == "-c") {
        Some(i) => {
            let path = args.get(i + 1).ok_or("--config needs a value")?;
            Config::load(path).map_err(|e| format!("Failed to load config {}: {}", path, e))?
        }
        None => Config::default(),
    };

    let mut opts = Options::default();
    let mut iter = args.iter();
    while let Some(&arg) = iter.next() {
        match arg {
            "-c" | "--config" => {
                iter.next();
            }
            "-o" | "--output" => opts.output = Some(parse_value::<String>(arg, iter.next())?),
            "-p" | "--precision" => config.precision = parse_value(arg, iter.next())?,
            "-s" | "--samples" => config.samples = parse_value(arg, iter.next())?,
            "--seed" => config.seed = parse_value(arg, iter.next())?,
            "--blind" => config.blind = true,
            "--no-materials" => config.consider.materials = false,
            "--no-normals" => config.consider.normals = false,
            "--no-uvs" => config.consider.uvs = false,
            "--no-tag-order" => config.consider.tag_order = false,
            "--no-selections" => config.consider.selections = false,
            "--no-other-tags" => config.consider.other_tags = false,
            _ if arg.starts_with('-') => return Err(format!("Unknown option: {}", arg)),
            _ => opts.inputs.push(arg.to_string()),
        }
    }
    config.validate().map_err(|e| e.to_string())?;
    opts.config = config;
    Ok(opts)
}

fn main() {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut level = LOG_INFO;
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-v" | "--verbose" => level = LOG_DEBUG,
            "-vv" | "--trace" => level = LOG_TRACE,
            "-q" | "--quiet" => level = LOG_QUIET,
            _ => filtered_args.push(arg),
        }
    }
    init_logging(level);

    if filtered_args.is_empty() {
        print_usage(&args[0]);
        return;
    }

    let command = filtered_args[0];
    if matches!(command, "h" | "help" | "-h" | "--help") {
        print_usage(&args[0]);
        return;
    }

    let opts = match parse_options(&filtered_args[1..]) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    let Some(path) = opts.inputs.first().cloned() else {
        eprintln!("Usage: {} {} <scene.json> [options]", args[0], command);
        std::process::exit(1);
    };

    match command {
        "run" | "r" => cmd_run(&path, &opts),
        "groups" | "g" => cmd_groups(&path, &opts),
        "info" | "i" => cmd_info(&path),
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage(&args[0]);
            std::process::exit(1);
        }
    }
}

fn print_usage(prog: &str) {
    println!(
        "Instancer {} (built {} {})",
        env!("CARGO_PKG_VERSION"),
        env!("INSTANCER_BUILD_DATE"),
        env!("INSTANCER_BUILD_TIME")
    );
    println!("Replace duplicate polygon objects with instances");
    println!();
    println!("Usage: {} [options] <command> <scene.json>", prog);
    println!();
    println!("Commands:");
    println!("  r, run     Replace duplicates and save the result (-o)");
    println!("  g, groups  List groups of duplicates without changing anything");
    println!("  i, info    Show scene summary");
    println!("  h, help    Show this help");
    println!();
    println!("Options:");
    println!("  -o, --output <file>   Write the resulting scene");
    println!("  -c, --config <file>   Load settings from JSON");
    println!("  -p, --precision <n>   Decimal digits compared (0-5, default 3)");
    println!("  -s, --samples <n>     Points sampled per object (default 100)");
    println!("  --seed <n>            Sampling seed (default 12345)");
    println!("  --blind               No progress output");
    println!("  --no-materials        Ignore material tags");
    println!("  --no-normals          Ignore phong and normal tags");
    println!("  --no-uvs              Ignore UV tags");
    println!("  --no-tag-order        Ignore tag order");
    println!("  --no-selections       Ignore selection tags");
    println!("  --no-other-tags       Ignore all other tags");
    println!("  -v, --verbose         Debug output");
    println!("  -vv, --trace          Trace output (very verbose)");
    println!("  -q, --quiet           Suppress output");
    println!();
    println!("INSTANCER_LOG overrides the log filter, e.g. INSTANCER_LOG=instancer::grouper=debug");
}

fn load_scene(path: &str) -> Scene {
    info!("Opening scene: {}", path);
    match Scene::load(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to open {}: {}", path, e);
            std::process::exit(1);
        }
    }
}

fn cmd_run(path: &str, opts: &Options) {
    let mut scene = load_scene(path);
    let objects = scene.mesh_objects();
    debug!("{} polygon objects", objects.len());

    let instancer = match Instancer::new(opts.config.clone()) {
        Ok(i) => i,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let mut progress = LogProgress::default();
    let report = match instancer.run(&mut scene, &objects, Some(&mut progress as &mut dyn ProgressSink)) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Instancing failed: {}", e);
            std::process::exit(1);
        }
    };

    println!("{}", report);
    if !report.unresolved.is_empty() {
        println!("Skipped {} objects without usable geometry", report.unresolved.len());
    }

    match &opts.output {
        Some(out) => {
            if let Err(e) = scene.save(out) {
                eprintln!("Failed to write {}: {}", out, e);
                std::process::exit(1);
            }
            info!("Saved {}", out);
        }
        None => println!("Result not saved (use -o <file>)"),
    }
}

fn cmd_groups(path: &str, opts: &Options) {
    let scene = load_scene(path);
    let objects = scene.mesh_objects();
    let instancer = match Instancer::new(opts.config.clone()) {
        Ok(i) => i,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    match instancer.find_groups(&scene, &objects) {
        Ok(groups) => print_groups(&scene, &groups),
        Err(e) => {
            eprintln!("Grouping failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_groups(scene: &Scene, groups: &Groups) {
    let name = |id: NodeId| scene.name(id).unwrap_or("?").to_string();

    for group in groups.duplicated() {
        println!("{}  ({} objects)", group.fingerprint, group.len());
        for member in &group.members {
            let marker = if group.representative().is_some_and(|r| r.id == member.id) { "*" } else { " " };
            println!("  {} {} {}", marker, member.id, name(member.id));
        }
    }
    println!();
    println!(
        "{} groups, {} objects would be replaced, {} unique",
        groups.duplicated().count(),
        groups.duplicate_count(),
        groups.iter().filter(|g| g.len() == 1).count()
    );
    if !groups.unresolved().is_empty() {
        println!("Unresolved:");
        for id in groups.unresolved() {
            println!("    {} {}", id, name(*id));
        }
    }
}

fn cmd_info(path: &str) {
    let scene = load_scene(path);

    let mut nulls = 0;
    let mut meshes = 0;
    let mut instances = 0;
    let mut points = 0;
    let mut polygons = 0;
    for id in scene.descendants(None) {
        let Some(node) = scene.node(id) else { continue };
        if let Some(mesh) = node.mesh() {
            meshes += 1;
            points += mesh.point_count();
            polygons += mesh.polygon_count();
        } else if node.instance().is_some() {
            instances += 1;
        } else {
            nulls += 1;
        }
    }

    println!("Scene: {}", path);
    println!();
    println!("Objects:");
    println!("  Nulls:     {}", nulls);
    println!("  Meshes:    {} ({} points, {} polygons)", meshes, points, polygons);
    println!("  Instances: {}", instances);
    println!();
    println!("Total objects: {}", scene.len());
}
