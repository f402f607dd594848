//! CLI: not part of the core (spec.md §6), kept deliberately small since
//! compiling SQL into DBM programs is someone else's job. It opens a
//! database file and runs one of a handful of hand-assembled DBM programs
//! so the core is exercisable without a SQL front end.

use anyhow::{bail, Context, Result};

use microdb::btree::node::Node;
use microdb::btree::NodeType;
use microdb::dbm::{Instruction as I, Machine, Opcode, Register};
use microdb::pager::Pager;

struct Args {
    db_path: String,
    command: Option<String>,
    verbosity: u8,
}

fn parse_args() -> Result<Args> {
    let mut db_path = None;
    let mut command = None;
    let mut verbosity = 0u8;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-c" => {
                command = Some(it.next().context("-c requires a command argument")?);
            }
            "-v" => verbosity += 1,
            other if db_path.is_none() => db_path = Some(other.to_string()),
            other => bail!("unexpected argument: {other}"),
        }
    }

    Ok(Args {
        db_path: db_path.unwrap_or_else(|| "microdb.db".to_string()),
        command,
        verbosity,
    })
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// Lists every page's node type — the closest thing to a table catalog this
/// engine has without a schema B-tree, which is out of core scope.
fn cmd_tables(pager: &mut Pager) -> Result<()> {
    for pn in 1..=pager.num_pages() as usize {
        match Node::load(pager, pn) {
            Ok(node) => println!("page {:>4}: {:?} ({} cells)", pn, node.node_type, node.n_cells()),
            Err(e) => println!("page {pn:>4}: unreadable ({e})"),
        }
    }
    Ok(())
}

/// Rewinds a cursor over `root` and prints every row's key and decoded
/// columns.
fn cmd_dump(pager: &mut Pager, root: usize) -> Result<()> {
    let program = vec![
        I::new(Opcode::Integer, root as i32, 0, 0),
        I::new(Opcode::OpenRead, 0, 0, 0),
        I::new(Opcode::Rewind, 0, 7, 0),
        I::new(Opcode::Key, 0, 1, 0),
        I::new(Opcode::Column, 0, 0, 2),
        I::new(Opcode::ResultRow, 1, 2, 0),
        I::new(Opcode::Next, 0, 3, 0),
        I::new(Opcode::Close, 0, 0, 0),
        I::new(Opcode::Halt, 0, 0, 0),
    ];
    let mut vm = Machine::new(pager, program);
    let (rows, code) = vm.run().context("dump program failed")?;
    for row in &rows {
        let key = match &row[0] {
            Register::Int32(k) => *k,
            _ => -1,
        };
        println!("{key}: {:?}", row[1]);
    }
    log::debug!("dump exited with code {code}");
    Ok(())
}

fn cmd_new(pager: &mut Pager, kind: &str) -> Result<()> {
    let node_type = match kind {
        "table" => NodeType::TableLeaf,
        "index" => NodeType::IndexLeaf,
        other => bail!("unknown root kind '{other}', expected 'table' or 'index'"),
    };
    let (page_no, _) = Node::new(pager, node_type)?;
    println!("created {kind} root at page {page_no}");
    Ok(())
}

fn run_command(pager: &mut Pager, command: &str) -> Result<()> {
    let mut parts = command.split_whitespace();
    match parts.next() {
        Some("tables") => cmd_tables(pager),
        Some("dump") => {
            let root: usize = parts
                .next()
                .context("usage: dump <root-page>")?
                .parse()
                .context("root page must be a number")?;
            cmd_dump(pager, root)
        }
        Some("new") => {
            let kind = parts.next().context("usage: new <table|index>")?;
            cmd_new(pager, kind)
        }
        Some(other) => bail!("unknown command '{other}' (try: tables, dump <root>, new <kind>)"),
        None => bail!("empty command"),
    }
}

fn main() -> Result<()> {
    let args = parse_args()?;
    init_logging(args.verbosity);

    let mut pager = Pager::open(&args.db_path)
        .with_context(|| format!("failed to open database file {}", args.db_path))?;

    match args.command {
        Some(cmd) => run_command(&mut pager, &cmd)?,
        None => {
            println!("microdb — no command given, showing tables (-c 'tables'|'dump N'|'new KIND' for more)");
            cmd_tables(&mut pager)?;
        }
    }

    Ok(())
}
