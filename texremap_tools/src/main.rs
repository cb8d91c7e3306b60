use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use compat_goldsrc::archive::ArchiveLoad;
use compat_goldsrc::pak::PakFile;
use compat_goldsrc::wad::WadFile;
use compat_goldsrc::{BspFile, DecodeDepth, EntityList, LumpOrder};
use texremap::locate::{self, BASE_GAME};
use texremap::sources;
use texremap::texinfo::{self, TexInfo, TexInfoParts};
use texremap::{apply_remap, GameMaterials, MaterialConfig, MaterialSet, TextureRemapper};

mod logging;

use logging::LogLevel;

const EXIT_SUCCESS: i32 = 0;
const EXIT_USAGE: i32 = 2;
const EXIT_CONFIG: i32 = 10;
const EXIT_BSP: i32 = 11;
const EXIT_MATERIALS: i32 = 12;
const EXIT_WAD: i32 = 13;
const EXIT_PAK: i32 = 14;
const EXIT_IO: i32 = 15;

#[derive(Parser)]
#[command(
    name = "bsptexremap",
    version,
    about = "Remaps GoldSrc map texture names onto materials.txt entries"
)]
struct Cli {
    #[arg(long, value_enum, default_value_t = LogLevel::Warn, global = true)]
    log: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Remap(RemapArgs),
    Texinfo(TexinfoArgs),
    Wad(WadArgs),
    Pak(PakArgs),
}

#[derive(Args)]
struct GameArgs {
    /// Game id from the material config; derived from the map path by default.
    #[arg(long)]
    game: Option<String>,

    /// Extra material config merged over the built-in one.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// The target mod's materials.txt.
    #[arg(long, value_name = "PATH")]
    materials: Option<PathBuf>,
}

#[derive(Parser)]
struct RemapArgs {
    #[arg(value_name = "MAP")]
    map: PathBuf,

    #[command(flatten)]
    game: GameArgs,

    /// File with custom texture material assignments.
    #[arg(long, value_name = "PATH")]
    custommat: Option<PathBuf>,

    /// Combine every assignment source instead of stopping at the first.
    #[arg(long)]
    custommat_read_all: bool,

    /// Write the edited map here instead of overwriting it.
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,

    /// Keep a copy of the map as <map>.bsp.bak.
    #[arg(long)]
    backup: bool,

    /// Texture info to write next to the map, e.g. embedded+external.
    #[arg(long, value_name = "PARTS")]
    dump_texinfo: Option<TexInfoParts>,
}

#[derive(Parser)]
struct TexinfoArgs {
    #[arg(value_name = "MAP")]
    map: PathBuf,

    #[command(flatten)]
    game: GameArgs,

    #[arg(long, value_name = "PARTS", default_value = "all")]
    parts: TexInfoParts,

    /// Report file; <map>_texinfo.txt by default.
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,
}

#[derive(Parser)]
struct WadArgs {
    #[command(subcommand)]
    command: WadCommand,
}

#[derive(Subcommand)]
enum WadCommand {
    List {
        #[arg(value_name = "WAD")]
        wad: PathBuf,
    },
}

#[derive(Parser)]
struct PakArgs {
    #[command(subcommand)]
    command: PakCommand,
}

#[derive(Subcommand)]
enum PakCommand {
    List {
        #[arg(value_name = "PAK")]
        pak: PathBuf,
    },
    Extract {
        #[arg(value_name = "PAK")]
        pak: PathBuf,
        #[arg(long, value_name = "DIR")]
        out: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.log);
    let exit_code = match cli.command {
        Commands::Remap(args) => run_remap(args),
        Commands::Texinfo(args) => run_texinfo(args),
        Commands::Wad(args) => run_wad(args),
        Commands::Pak(args) => run_pak(args),
    };
    std::process::exit(exit_code);
}

fn run_remap(args: RemapArgs) -> i32 {
    // compilers pass the map name without its extension
    let map_path = args.map.with_extension("bsp");
    println!("loading map {}", map_path.display());
    let mut bsp = match load_map(&map_path) {
        Ok(bsp) => bsp,
        Err(code) => return code,
    };
    let materials = match resolve_game(&args.game, &map_path) {
        Ok(materials) => materials,
        Err(code) => return code,
    };
    let entities = bsp.entities().cloned().unwrap_or_default();

    let parts = args.dump_texinfo.unwrap_or_default();
    let early = TexInfoParts::EMBEDDED | TexInfoParts::EXTERNAL | TexInfoParts::GROUPED;
    if parts.intersects(early) {
        let code = write_texinfo(
            &map_path,
            &locate::texinfo_path(&map_path),
            TexInfoParts::HEADER | TexInfoParts::MATERIAL_NAMES | (parts & early),
            &bsp,
            &materials,
            None,
        );
        if code != EXIT_SUCCESS {
            return code;
        }
    }

    let material_set = match load_material_set(&args.game, &map_path, &entities, &materials) {
        Ok(set) => set,
        Err(code) => return code,
    };
    println!("{:>3} entries read from materials file", material_set.len());
    let choice = material_set.choice_cut();
    println!("{:>3} entries available as remap targets", choice.len());

    if parts.contains(TexInfoParts::UNIQUE_GROUPED) {
        let code = write_texinfo(
            &map_path,
            &locate::texinfo_path(&map_path),
            TexInfoParts::UNIQUE_GROUPED,
            &bsp,
            &materials,
            Some(&material_set),
        );
        if code != EXIT_SUCCESS {
            return code;
        }
    }

    let wanted = match sources::load_wanted_set(
        &entities,
        &map_path,
        args.custommat.as_deref(),
        &materials,
        args.custommat_read_all,
    ) {
        Ok(wanted) => wanted,
        Err(err) => {
            eprintln!("custom materials failed: {}", err);
            return EXIT_MATERIALS;
        }
    };
    let overrides = sources::overrides_from_entities(&entities);
    if wanted.is_empty() && overrides.is_empty() {
        println!("no texture remap entries found, nothing to do");
        return EXIT_SUCCESS;
    }
    println!("{} texture remap entries", wanted.len() + overrides.len());

    if args.backup {
        match locate::backup_file(&map_path) {
            Ok(Some(path)) => println!("backup written to {}", path.display()),
            Ok(None) => log::info!("backup already exists, left as is"),
            Err(err) => {
                eprintln!("backup failed: {}", err);
                return EXIT_IO;
            }
        }
    }

    let mut remapper = TextureRemapper::new(wanted, choice).with_overrides(overrides);
    let report = match bsp.textures_mut() {
        Some(textures) => apply_remap(&mut remapper, textures),
        None => {
            eprintln!("map has no texture lump");
            return EXIT_BSP;
        }
    };
    println!("renamed: {}", report.renamed);
    println!("unchanged: {}", report.unchanged);
    if report.renamed == 0 {
        println!("no texture names changed, map left as is");
        return EXIT_SUCCESS;
    }

    let out_path = args.out.unwrap_or_else(|| map_path.clone());
    println!("writing {}", out_path.display());
    if let Err(err) = bsp.write(&out_path) {
        eprintln!("map write failed: {}", err);
        return EXIT_BSP;
    }
    EXIT_SUCCESS
}

fn run_texinfo(args: TexinfoArgs) -> i32 {
    let map_path = args.map.with_extension("bsp");
    let bsp = match load_map(&map_path) {
        Ok(bsp) => bsp,
        Err(code) => return code,
    };
    let materials = match resolve_game(&args.game, &map_path) {
        Ok(materials) => materials,
        Err(code) => return code,
    };

    let needs_set = TexInfoParts::UNIQUE_GROUPED | TexInfoParts::MATERIAL_SET;
    let material_set = if args.parts.intersects(needs_set) {
        let entities = bsp.entities().cloned().unwrap_or_default();
        match load_material_set(&args.game, &map_path, &entities, &materials) {
            Ok(set) => Some(set),
            Err(code) => return code,
        }
    } else {
        None
    };

    let out_path = args
        .out
        .unwrap_or_else(|| locate::texinfo_path(&map_path));
    let code = write_texinfo(
        &map_path,
        &out_path,
        TexInfoParts::HEADER | TexInfoParts::MATERIAL_NAMES | args.parts,
        &bsp,
        &materials,
        material_set.as_ref(),
    );
    if code == EXIT_SUCCESS {
        println!("texture info written to {}", out_path.display());
    }
    code
}

fn run_wad(args: WadArgs) -> i32 {
    match args.command {
        WadCommand::List { wad } => wad_list(&wad),
    }
}

fn wad_list(path: &Path) -> i32 {
    let wad = match WadFile::read(path, ArchiveLoad::DirectoryOnly) {
        Ok(wad) => wad,
        Err(err) => {
            eprintln!("wad parse failed: {}", err);
            return EXIT_WAD;
        }
    };
    println!("wad: {}", path.display());
    for entry in wad.entries() {
        println!(
            "{:>10} {:>10} {:>10} {:#04x} {}",
            entry.offset, entry.disk_size, entry.size, entry.kind, entry.name
        );
    }
    EXIT_SUCCESS
}

fn run_pak(args: PakArgs) -> i32 {
    match args.command {
        PakCommand::List { pak } => pak_list(&pak),
        PakCommand::Extract { pak, out } => pak_extract(&pak, &out),
    }
}

fn pak_list(path: &Path) -> i32 {
    let pak = match PakFile::read(path, ArchiveLoad::DirectoryOnly) {
        Ok(pak) => pak,
        Err(err) => {
            eprintln!("pak parse failed: {}", err);
            return EXIT_PAK;
        }
    };
    println!("pak: {}", path.display());
    for entry in pak.entries() {
        println!("{:>10} {:>10} {}", entry.offset, entry.size, entry.name);
    }
    EXIT_SUCCESS
}

fn pak_extract(path: &Path, out_dir: &Path) -> i32 {
    let mut reader = match File::open(path) {
        Ok(file) => BufReader::new(file),
        Err(err) => {
            eprintln!("pak open failed: {}", err);
            return EXIT_PAK;
        }
    };
    let mut pak = match PakFile::load(&mut reader, ArchiveLoad::DirectoryOnly) {
        Ok(pak) => pak,
        Err(err) => {
            eprintln!("pak parse failed: {}", err);
            return EXIT_PAK;
        }
    };
    match pak.extract_all(&mut reader, out_dir) {
        Ok(count) => {
            println!("extracted {} entries to {}", count, out_dir.display());
            EXIT_SUCCESS
        }
        Err(err) => {
            eprintln!("pak extract failed: {}", err);
            EXIT_PAK
        }
    }
}

fn load_map(map_path: &Path) -> Result<BspFile, i32> {
    if !map_path.is_file() {
        eprintln!("map not found: {}", map_path.display());
        return Err(EXIT_USAGE);
    }
    BspFile::read(map_path, LumpOrder::guess(map_path), DecodeDepth::Basic).map_err(|err| {
        eprintln!("map parse failed: {}", err);
        EXIT_BSP
    })
}

/// An explicit `--game` must exist in the config; a game derived from the
/// map path falls back to the base game.
fn resolve_game(args: &GameArgs, map_path: &Path) -> Result<Arc<GameMaterials>, i32> {
    let mut config = MaterialConfig::builtin().map_err(|err| {
        eprintln!("built-in material config invalid: {}", err);
        EXIT_CONFIG
    })?;
    if let Some(path) = &args.config {
        let user = MaterialConfig::load(path).map_err(|err| {
            eprintln!("material config failed: {}", err);
            EXIT_CONFIG
        })?;
        config.merge(user);
    }

    let game = match &args.game {
        Some(game) => game.to_ascii_lowercase(),
        None => locate::mod_name_from_map(map_path)
            .filter(|game| config.contains_game(game))
            .unwrap_or_else(|| BASE_GAME.to_string()),
    };
    log::info!("material alphabet of {}", game);
    config.resolve(&game).map_err(|err| {
        eprintln!("material config failed: {}", err);
        EXIT_CONFIG
    })
}

fn load_material_set(
    args: &GameArgs,
    map_path: &Path,
    entities: &EntityList,
    materials: &Arc<GameMaterials>,
) -> Result<MaterialSet, i32> {
    let Some(path) = locate::search_materials_file(map_path, entities, args.materials.as_deref())
    else {
        eprintln!("no materials.txt to read");
        return Err(EXIT_MATERIALS);
    };
    println!("materials file {}", path.display());
    MaterialSet::from_materials_file(&path, Arc::clone(materials)).map_err(|err| {
        eprintln!("materials file failed: {}", err);
        EXIT_MATERIALS
    })
}

fn write_texinfo(
    map_path: &Path,
    out_path: &Path,
    parts: TexInfoParts,
    bsp: &BspFile,
    materials: &Arc<GameMaterials>,
    material_set: Option<&MaterialSet>,
) -> i32 {
    let map_name = map_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let wads = bsp
        .entities()
        .map(|entities| sources::wad_list(entities, true))
        .unwrap_or_default();
    let info = TexInfo {
        map_name: &map_name,
        textures: bsp.textures().unwrap_or_default(),
        materials,
        material_set,
        wads: &wads,
    };
    match texinfo::dump_texinfo(out_path, parts, &info) {
        Ok(()) => EXIT_SUCCESS,
        Err(err) => {
            eprintln!("texture info failed: {}", err);
            EXIT_IO
        }
    }
}
