use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use horadric_core::attributes::Attribute;
use horadric_core::io::{load, save, save_pair};
use horadric_core::ops::{create_socketable, exchange_horadric};
use horadric_core::progress::{Difficulty, DifficultyPreset};
use horadric_core::status::{character_status, describe_modifications, item_summaries};
use horadric_core::{
    AdornmentKind, Catalog, ItemRecord, ModTable, SaveBuffer, SaveError, Storage,
    item::extended::occupied_sockets, item::socketable_code,
};

/// Small-scale mutations for Diablo II .d2s save files (version 96).
///
/// The motivating operation is --exchange-horadric: two characters stuff
/// items into their Horadric Cubes, this tool swaps the cube contents.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Target .d2s character files (one, or two for the exchange).
    #[arg(value_name = "CHARACTER.d2s", num_args = 0..=2)]
    pfnames: Vec<PathBuf>,

    /// Skip the timestamped .backup copies written before any mutation.
    #[arg(long)]
    omit_backup: bool,
    /// Directory receiving the backup copies; defaults to the save's own.
    #[arg(long, value_name = "DIR")]
    backup_dir: Option<PathBuf>,
    /// Directory holding item_codes.tsv, armor_weapons.tsv and mods.tsv
    /// overriding the built-in tables.
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Print a status report for each file.
    #[arg(long)]
    info: bool,
    /// Emit the status report as JSON.
    #[arg(long)]
    json: bool,
    /// Decode and print the modification lists of the cube items.
    #[arg(long)]
    mods: bool,

    /// Exchange the Horadric Cube contents of exactly two characters.
    #[arg(long)]
    exchange_horadric: bool,
    /// Remove every item from the Horadric Cube.
    #[arg(long)]
    drop_horadric: bool,
    /// Write the raw cube item bytes to this file.
    #[arg(long, value_name = "FILE")]
    save_horadric: Option<PathBuf>,
    /// Replace the cube contents with a file written by --save-horadric.
    #[arg(long, value_name = "FILE")]
    load_horadric: Option<PathBuf>,
    /// Pull socketed items out of the cube items, keeping the stones.
    #[arg(long)]
    empty_sockets_horadric: bool,
    /// Set this many sockets on each socketable cube item.
    #[arg(long, value_name = "N")]
    set_sockets_horadric: Option<u8>,
    /// Dispel the magic of the cube items.
    #[arg(long)]
    dispel_magic: bool,
    /// Toggle the ethereal state of each cube item.
    #[arg(long)]
    toggle_ethereal: bool,
    /// Clone the cube items' magic into jewels ('jew', default), small
    /// charms ('cm1'), rings ('rin') or amulets ('amu').
    #[arg(
        long,
        value_name = "CODE",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "jew"
    )]
    jewelize: Option<String>,
    /// Upgrade each cube item along normal, exceptional, elite.
    #[arg(long)]
    regrade_horadric: bool,
    /// Create a Horadric Cube in the top-left backpack corner if missing.
    #[arg(long)]
    ensure_horadric: bool,
    /// "FILE:el,ith,b4" - write a cube-content file of runes and gems.
    #[arg(long, value_name = "SPEC")]
    create_rune_cube: Option<String>,

    /// Set the characters to hardcore.
    #[arg(long)]
    hardcore: bool,
    /// Set the characters to softcore.
    #[arg(long)]
    softcore: bool,
    /// Revive a dead character and heal it.
    #[arg(long)]
    revive_self: bool,
    /// Revive a dead mercenary.
    #[arg(long)]
    revive_merc: bool,
    /// Dispel an iron golem and recover its item.
    #[arg(long)]
    redeem_golem: bool,

    /// Set the unused attribute-point pool.
    #[arg(long, value_name = "N")]
    boost_attributes: Option<u32>,
    /// Set the unused skill-point pool.
    #[arg(long, value_name = "N")]
    boost_skills: Option<u32>,
    /// Return all spent attribute points for redistribution.
    #[arg(long)]
    reset_attributes: bool,
    /// Unlearn all skills, returning them as skill points.
    #[arg(long)]
    reset_skills: bool,

    /// Open nightmare difficulty, lifting the character to its floor.
    #[arg(long)]
    enable_nightmare: bool,
    /// Open hell (and nightmare) difficulty.
    #[arg(long)]
    enable_hell: bool,
    /// Crown the character victor of hell.
    #[arg(long)]
    enable_nirvana: bool,

    /// Waypoint pattern, optionally "DIFFICULTY-" prefixed ("10-111..."),
    /// one character per waypoint: 1 on, 0 off, anything else unchanged.
    #[arg(long, value_name = "PATTERN")]
    set_waypoints: Option<String>,
    /// Quest pattern in the same format, one character per quest.
    #[arg(long, value_name = "PATTERN")]
    set_quests: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(&cli) {
        eprintln!("error: {error}");
        process::exit(2);
    }
}

struct Session {
    path: PathBuf,
    save: SaveBuffer,
    dirty: bool,
}

fn run(cli: &Cli) -> Result<(), SaveError> {
    let (catalog, table) = match &cli.data_dir {
        Some(dir) => (Catalog::load_dir(dir)?, ModTable::load_path(&dir.join("mods.tsv"))?),
        None => (Catalog::builtin(), ModTable::builtin()),
    };

    if let Some(spec) = &cli.create_rune_cube {
        return create_rune_cube(spec);
    }

    let mut sessions = Vec::with_capacity(cli.pfnames.len());
    for path in &cli.pfnames {
        sessions.push(Session {
            path: path.clone(),
            save: load(path)?,
            dirty: false,
        });
    }
    if sessions.is_empty() {
        eprintln!("no character files given; try --help");
        return Ok(());
    }

    if !cli.omit_backup {
        for session in &sessions {
            backup(session, cli.backup_dir.as_deref())?;
        }
    }

    if cli.info {
        for session in &sessions {
            print_info(session, &catalog, cli.json)?;
        }
    }
    if cli.mods {
        for session in &sessions {
            print_mods(session, &catalog, &table)?;
        }
    }

    if cli.hardcore && cli.softcore {
        eprintln!("both --hardcore and --softcore requested; ignoring both");
    } else if cli.hardcore || cli.softcore {
        for session in &mut sessions {
            session.save.set_hardcore(cli.hardcore);
            session.dirty = true;
            println!(
                "set {} to {}core",
                session.save.name(),
                if cli.hardcore { "hard" } else { "soft" }
            );
        }
    }

    if cli.revive_self {
        for session in &mut sessions {
            session.save.revive()?;
            session.dirty = true;
            println!("revived {}", session.save.name());
        }
    }
    if cli.revive_merc {
        for session in &mut sessions {
            session.save.set_mercenary_dead(false);
            session.dirty = true;
            println!("revived {}'s mercenary", session.save.name());
        }
    }
    if cli.redeem_golem {
        for session in &mut sessions {
            if session.save.redeem_golem(&catalog)? {
                session.dirty = true;
                println!("redeemed {}'s iron golem", session.save.name());
            } else {
                println!("{} commands no iron golem", session.save.name());
            }
        }
    }

    if cli.ensure_horadric {
        for session in &mut sessions {
            if session.save.ensure_horadric(&catalog)? {
                session.dirty = true;
                println!("gave {} a Horadric Cube", session.save.name());
            }
        }
    }
    if cli.drop_horadric {
        for session in &mut sessions {
            let dropped = session.save.drop_horadric()?;
            session.dirty = true;
            println!("dropped {dropped} items from {}'s cube", session.save.name());
        }
    }
    if let Some(path) = &cli.save_horadric {
        let session = single_target(&sessions, "--save-horadric")?;
        let bytes = session.save.grep_horadric();
        fs::write(path, &bytes)
            .map_err(|e| SaveError::io(format!("failed to write {}: {e}", path.display())))?;
        println!("wrote {} cube bytes to {}", bytes.len(), path.display());
    }
    if let Some(path) = &cli.load_horadric {
        if sessions.len() != 1 {
            return Err(SaveError::io(
                "--load-horadric needs exactly one character file",
            ));
        }
        let bytes = fs::read(path)
            .map_err(|e| SaveError::io(format!("failed to read {}: {e}", path.display())))?;
        let session = &mut sessions[0];
        session.save.insert_horadric(&bytes)?;
        session.dirty = true;
        println!("loaded cube contents from {}", path.display());
    }

    if cli.empty_sockets_horadric {
        for session in &mut sessions {
            empty_sockets(session, &catalog, &table)?;
        }
    }
    if let Some(count) = cli.set_sockets_horadric {
        for session in &mut sessions {
            for_each_cube_item(session, |save, record| {
                save.set_sockets(&catalog, &record, count).map(|_| ())
            });
        }
    }
    if cli.dispel_magic {
        for session in &mut sessions {
            for_each_cube_item(session, |save, record| save.dispel_magic(&catalog, &record));
        }
    }
    if cli.toggle_ethereal {
        for session in &mut sessions {
            for_each_cube_item(session, |save, record| {
                save.set_ethereal(&catalog, &record, None).map(|_| ())
            });
        }
    }
    if let Some(code) = &cli.jewelize {
        let kind = AdornmentKind::from_code(code);
        for session in &mut sessions {
            for_each_cube_item(session, |save, record| {
                save.jewelize(&catalog, &record, kind).map(|_| ())
            });
        }
    }
    if cli.regrade_horadric {
        for session in &mut sessions {
            for_each_cube_item(session, |save, record| {
                save.regrade(&catalog, &record, None).map(|_| ())
            });
        }
    }

    if let Some(value) = cli.boost_attributes {
        for session in &mut sessions {
            session.save.boost_attribute(Attribute::UnusedStats, value)?;
            session.dirty = true;
        }
    }
    if let Some(value) = cli.boost_skills {
        for session in &mut sessions {
            session.save.boost_attribute(Attribute::UnusedSkills, value)?;
            session.dirty = true;
        }
    }
    if cli.reset_attributes {
        for session in &mut sessions {
            let returned = session.save.reset_attributes()?;
            session.dirty = true;
            println!(
                "returned {returned} attribute points to {}",
                session.save.name()
            );
        }
    }
    if cli.reset_skills {
        for session in &mut sessions {
            let returned = session.save.reset_skills()?;
            session.dirty = true;
            println!("returned {returned} skill points to {}", session.save.name());
        }
    }

    for (enabled, preset) in [
        (cli.enable_nightmare, DifficultyPreset::NIGHTMARE),
        (cli.enable_hell, DifficultyPreset::HELL),
        (cli.enable_nirvana, DifficultyPreset::NIRVANA),
    ] {
        if !enabled {
            continue;
        }
        for session in &mut sessions {
            if session.save.enable_difficulty(preset)? {
                session.dirty = true;
            }
        }
    }

    if let Some(pattern) = &cli.set_waypoints {
        for session in &mut sessions {
            let (difficulty, bitmap) = split_difficulty_pattern(&session.save, pattern);
            session.save.set_waypoints(difficulty, &bitmap)?;
            session.dirty = true;
        }
    }
    if let Some(pattern) = &cli.set_quests {
        for session in &mut sessions {
            let (difficulty, bitmap) = split_difficulty_pattern(&session.save, pattern);
            session.save.set_quests(difficulty, &bitmap)?;
            session.dirty = true;
        }
    }

    if cli.exchange_horadric {
        if sessions.len() != 2 {
            return Err(SaveError::io(
                "--exchange-horadric needs exactly two character files",
            ));
        }
        let (first, second) = sessions.split_at_mut(1);
        exchange_horadric(&mut first[0].save, &mut second[0].save)?;
        first[0].dirty = true;
        second[0].dirty = true;
        println!("Horadric exchange complete.");
    }

    persist(&mut sessions, cli.exchange_horadric)?;
    Ok(())
}

/// Write all dirty buffers back. An exchange commits both files together
/// through the staged pair write; anything else is saved one by one.
fn persist(sessions: &mut [Session], paired: bool) -> Result<(), SaveError> {
    for session in sessions.iter_mut() {
        if session.dirty {
            session.save.finalize();
        }
    }
    if paired {
        let pairs: Vec<(&SaveBuffer, &Path)> = sessions
            .iter()
            .filter(|s| s.dirty)
            .map(|s| (&s.save, s.path.as_path()))
            .collect();
        return save_pair(&pairs);
    }
    for session in sessions.iter() {
        if session.dirty {
            save(&session.save, &session.path)?;
            println!("wrote {}", session.path.display());
        }
    }
    Ok(())
}

fn single_target<'a>(sessions: &'a [Session], what: &str) -> Result<&'a Session, SaveError> {
    if sessions.len() == 1 {
        Ok(&sessions[0])
    } else {
        Err(SaveError::io(format!(
            "{what} needs exactly one character file"
        )))
    }
}

fn backup(session: &Session, backup_dir: Option<&Path>) -> Result<(), SaveError> {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let file_name = session
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "character.d2s".to_string());
    let dir = backup_dir
        .map(Path::to_path_buf)
        .or_else(|| session.path.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    let target = dir.join(format!("{seconds}_{file_name}.backup"));
    fs::copy(&session.path, &target)
        .map_err(|e| SaveError::io(format!("failed to back up to {}: {e}", target.display())))?;
    println!("backed up {} to {}", session.path.display(), target.display());
    Ok(())
}

fn print_info(session: &Session, catalog: &Catalog, as_json: bool) -> Result<(), SaveError> {
    let status = character_status(&session.save);
    let items = item_summaries(&session.save, catalog);
    if as_json {
        let value = serde_json::json!({ "character": status, "items": items });
        println!(
            "{}",
            serde_json::to_string_pretty(&value)
                .map_err(|e| SaveError::io(format!("json encoding failed: {e}")))?
        );
        return Ok(());
    }

    let rank = status.rank.clone().map(|r| r + " ").unwrap_or_default();
    println!(
        "{rank}{} ({}), level {} {} {}{}",
        status.name,
        session.path.display(),
        status.level,
        if status.hardcore { "hardcore" } else { "softcore" },
        status.class,
        if status.dead { ", dead" } else { "" },
    );
    println!(
        "  version {}, {} bytes (header says {}), checksum {:#010x} (computed {:#010x})",
        status.version,
        status.file_size,
        status.stored_file_size,
        status.stored_checksum,
        status.computed_checksum,
    );
    println!(
        "  cube: {}, holding {} items; {} direct player items",
        if status.has_horadric_cube { "owned" } else { "missing" },
        status.cube_item_count,
        status.player_item_count,
    );
    if status.mercenary.seed != 0 {
        println!(
            "  mercenary: seed {}, type {}, experience {}{}",
            status.mercenary.seed,
            status.mercenary.kind,
            status.mercenary.experience,
            if status.mercenary.dead { ", dead" } else { "" },
        );
    }
    for item in &items {
        println!(
            "  [{:?} #{:<2}] {} ({}) {} at ({},{}) sockets {}/{}{}",
            item.block,
            item.index,
            item.name,
            item.quality.as_deref().unwrap_or("-"),
            item.storage,
            item.row,
            item.col,
            item.occupied_sockets,
            item.sockets,
            if item.ethereal { ", ethereal" } else { "" },
        );
    }
    for storage in [Storage::Cube, Storage::Stash, Storage::Inventory] {
        println!("  {storage} occupation:");
        for line in session
            .save
            .occupancy_map(catalog, storage)
            .render()
            .lines()
        {
            println!("    {line}");
        }
    }
    Ok(())
}

fn print_mods(session: &Session, catalog: &Catalog, table: &ModTable) -> Result<(), SaveError> {
    for record in session.save.cube_contents() {
        let view = session.save.item_view(&record);
        let lines = describe_modifications(&session.save, catalog, table, &record)?;
        if lines.is_empty() {
            continue;
        }
        println!("{}:", view.describe(catalog));
        for line in lines {
            println!("  {line}");
        }
    }
    Ok(())
}

/// Apply one mutation to every cube item, back to front so earlier
/// records stay valid across resizes; refusals are reported per item and
/// never abort the batch.
fn for_each_cube_item<F>(session: &mut Session, mut apply: F)
where
    F: FnMut(&mut SaveBuffer, ItemRecord) -> Result<(), SaveError>,
{
    let total = session.save.cube_contents().len();
    for index in (0..total).rev() {
        let records = session.save.cube_contents();
        let Some(&record) = records.get(index) else {
            continue;
        };
        match apply(&mut session.save, record) {
            Ok(()) => session.dirty = true,
            Err(error) => eprintln!("skipped: {error}"),
        }
    }
}

fn empty_sockets(
    session: &mut Session,
    catalog: &Catalog,
    table: &ModTable,
) -> Result<(), SaveError> {
    // Each separation rewrites the item area, so re-derive the cube
    // snapshot after every pass.
    for _ in 0..6 {
        let records = session.save.cube_contents();
        let target = records.into_iter().find(|record| {
            occupied_sockets(record.range.slice(session.save.bytes()), catalog).unwrap_or(0) > 0
        });
        let Some(record) = target else {
            break;
        };
        match session
            .save
            .separate_socketed_items(catalog, table, &record)
        {
            Ok(()) => session.dirty = true,
            Err(error) => {
                eprintln!("skipped: {error}");
                break;
            }
        }
    }
    Ok(())
}

fn split_difficulty_pattern(save: &SaveBuffer, pattern: &str) -> (Difficulty, String) {
    if let Some((prefix, bitmap)) = pattern.split_once('-')
        && let Ok(value) = prefix.parse::<u8>()
    {
        let difficulty = match value {
            0..=4 => Difficulty::Normal,
            5..=9 => Difficulty::Nightmare,
            _ => Difficulty::Hell,
        };
        return (difficulty, bitmap.to_string());
    }
    (save.highest_open_difficulty(), pattern.to_string())
}

/// "FILE:el,ith,b4" - build a loadable cube-content file of runes/gems.
fn create_rune_cube(spec: &str) -> Result<(), SaveError> {
    let Some((path, names)) = spec.split_once(':') else {
        return Err(SaveError::io(
            "--create-rune-cube expects FILE:name,name,...",
        ));
    };
    let mut content = Vec::new();
    let mut count = 0u8;
    for name in names.split(',').take(12) {
        let Some(code) = socketable_code(name) else {
            eprintln!("skipping unknown rune or gem '{name}'");
            continue;
        };
        let row = count / 3;
        let col = count % 3;
        content.extend_from_slice(&create_socketable(code, Storage::Cube, row, col)?);
        count += 1;
    }
    fs::write(path, &content)
        .map_err(|e| SaveError::io(format!("failed to write {path}: {e}")))?;
    println!("wrote runic cube with {count} socketables to {path}");
    Ok(())
}
