use anyhow::{Context as _, Result};
use bg3_modsharer::{
    app::{self, App},
    bg3::{self, GamePaths},
    config::{Context, ToolConfig},
    logging,
    prompt::Console,
};
use std::path::PathBuf;

#[derive(Default)]
struct Args {
    game_root: Option<PathBuf>,
    larian_dir: Option<PathBuf>,
    bundle_root: Option<PathBuf>,
    verbose: bool,
}

fn main() -> Result<()> {
    let Some(args) = parse_args()? else {
        return Ok(());
    };
    logging::init(args.verbose);

    let mut config = ToolConfig::load_or_create()?;
    let mut operator = Console;

    // Explicit path, then the last working one, then the Steam Deck default.
    let mut candidates = Vec::new();
    candidates.extend(args.game_root.clone());
    candidates.extend(config.game_root.clone());
    if let Some(home) = directories::BaseDirs::new().map(|base| base.home_dir().to_path_buf()) {
        candidates.push(home.join(".steam/steam/steamapps/common/Baldurs Gate 3"));
    }

    let Some(game_root) = app::locate_game_root(&mut operator, &candidates, bg3::find_game_root)?
    else {
        return Ok(());
    };

    let larian_dir = args
        .larian_dir
        .clone()
        .or_else(|| config.larian_dir.clone().filter(|dir| dir.is_dir()))
        .or_else(bg3::find_larian_dir);
    let Some(larian_dir) = larian_dir.filter(|dir| bg3::looks_like_larian_dir(dir)) else {
        println!("App data folder not found.");
        return Ok(());
    };

    let paths = GamePaths::new(&game_root, &larian_dir)?;
    if let Err(err) = config.remember(&paths) {
        tracing::warn!(error = %format!("{err:#}"), "unable to save config");
    }

    let bundle_root = match args.bundle_root {
        Some(root) => root,
        None => std::env::current_dir().context("resolve current directory")?,
    };
    tracing::debug!(bundle = %bundle_root.display(), "using bundle");

    let ctx = Context::new(paths, &bundle_root);
    App::new(ctx, operator).run()
}

fn parse_args() -> Result<Option<Args>> {
    let mut parsed = Args::default();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--game" | "-g" => {
                parsed.game_root = Some(args.next().context("--game requires a path")?.into());
            }
            "--user-dir" => {
                parsed.larian_dir = Some(args.next().context("--user-dir requires a path")?.into());
            }
            "--bundle" | "-b" => {
                parsed.bundle_root = Some(args.next().context("--bundle requires a path")?.into());
            }
            "--verbose" | "-v" => parsed.verbose = true,
            "--help" | "-h" => {
                print_help();
                return Ok(None);
            }
            "--version" | "-V" => {
                println!("bg3-modsharer v{}", env!("CARGO_PKG_VERSION"));
                return Ok(None);
            }
            other if !other.is_empty() && !other.starts_with('-') && parsed.game_root.is_none() => {
                parsed.game_root = Some(PathBuf::from(other));
            }
            other => eprintln!("ignoring unknown argument: {other}"),
        }
    }

    Ok(Some(parsed))
}

fn print_help() {
    println!("bg3-modsharer");
    println!("  [path] | --game <path>   Baldur's Gate 3 install folder");
    println!("  --user-dir <path>        Larian data folder (holds PlayerProfiles)");
    println!("  --bundle <path>          Folder containing Mods/Game and Mods/AppData");
    println!("                           (defaults to the current directory)");
    println!("  -v, --verbose            Debug logging");
}
