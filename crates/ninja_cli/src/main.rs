//! Console entry point for the ninja walkthrough.
//!
//! # Responsibility
//! - Resolve configuration and start file logging.
//! - Run exactly one walkthrough step, named by the optional positional
//!   argument, and print the ninjas it touched.

use anyhow::{anyhow, Context};
use clap::{Parser, ValueEnum};
use log::info;
use ninja_core::service::walkthrough::DEFAULT_FIND_KEY;
use ninja_core::{init_logging, AppConfig, Ninja, NinjaWalkthrough, Shared};

#[derive(Debug, Parser)]
#[command(name = "ninja_cli")]
#[command(about = "Runs one step of the ninja unit-of-work walkthrough", long_about = None)]
struct Cli {
    /// Walkthrough step to run
    #[arg(value_enum, default_value_t = Step::SimpleNinjaGraphQuery)]
    step: Step,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Step {
    /// Insert the clan the other inserts refer to
    InsertClan,
    InsertNinja,
    InsertMultipleNinjas,
    SimpleNinjaQueries,
    QueryAndUpdateNinja,
    QueryAndUpdateNinjaDisconnected,
    RetrieveDataWithFind,
    RetrieveDataWithStoredProc,
    DeleteNinja,
    DeleteNinjaDisconnected,
    InsertNinjaWithEquipment,
    SimpleNinjaGraphQuery,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let step = cli.step;

    let config = AppConfig::from_env().context("failed to read configuration")?;
    init_logging(&config.log_level, config.log_dir_str()?).map_err(|err| anyhow!(err))?;
    info!(
        "event=cli_start module=cli status=ok step={step:?} db_path={}",
        config.db_path.display()
    );

    run(&NinjaWalkthrough::new(&config.db_path), step)
        .with_context(|| format!("walkthrough step {step:?} failed"))
}

fn run(walkthrough: &NinjaWalkthrough, step: Step) -> anyhow::Result<()> {
    match step {
        Step::InsertClan => {
            let clan = walkthrough.insert_clan("Vermont Clan")?;
            let clan = clan.borrow();
            println!("Clan: {} (id {})", clan.clan_name, clan.id);
        }
        Step::InsertNinja => print_ninja(&walkthrough.insert_ninja()?),
        Step::InsertMultipleNinjas => {
            walkthrough
                .insert_multiple_ninjas()?
                .iter()
                .for_each(print_ninja);
        }
        Step::SimpleNinjaQueries => {
            let queries = walkthrough.simple_ninja_queries()?;
            queries.all.iter().for_each(print_ninja);
            match &queries.peter_san {
                Some(ninja) => print_ninja(ninja),
                None => println!("Ninja: <none named PeterSan>"),
            }
        }
        Step::QueryAndUpdateNinja => print_optional(walkthrough.query_and_update_ninja()?),
        Step::QueryAndUpdateNinjaDisconnected => {
            print_optional(walkthrough.query_and_update_ninja_disconnected()?)
        }
        Step::RetrieveDataWithFind => {
            let found = walkthrough.retrieve_data_with_find(DEFAULT_FIND_KEY)?;
            println!("After Find#1: {}", name_or_none(found.first.as_ref()));
            println!("After Find#2: {}", name_or_none(found.second.as_ref()));
            println!("Round trips: {}", found.round_trips);
        }
        Step::RetrieveDataWithStoredProc => {
            walkthrough
                .retrieve_data_with_stored_proc()?
                .iter()
                .for_each(print_ninja);
        }
        Step::DeleteNinja => print_optional(walkthrough.delete_ninja()?),
        Step::DeleteNinjaDisconnected => print_optional(walkthrough.delete_ninja_disconnected()?),
        Step::InsertNinjaWithEquipment => {
            print_ninja_with_equipment(&walkthrough.insert_ninja_with_equipment()?)
        }
        Step::SimpleNinjaGraphQuery => match walkthrough.simple_ninja_graph_query()? {
            Some(ninja) => print_ninja_with_equipment(&ninja),
            None => println!("Ninja: <none>"),
        },
    }
    Ok(())
}

fn print_ninja(ninja: &Shared<Ninja>) {
    let ninja = ninja.borrow();
    println!(
        "Ninja: {} (id {}, oniwaban {})",
        ninja.name, ninja.id, ninja.served_in_oniwaban
    );
}

fn print_optional(ninja: Option<Shared<Ninja>>) {
    match ninja {
        Some(ninja) => print_ninja(&ninja),
        None => println!("Ninja: <none>"),
    }
}

fn print_ninja_with_equipment(ninja: &Shared<Ninja>) {
    print_ninja(ninja);
    for item in &ninja.borrow().equipment_owned {
        let item = item.borrow();
        println!("  {} ({})", item.name, item.kind.as_str());
    }
}

fn name_or_none(ninja: Option<&Shared<Ninja>>) -> String {
    ninja.map_or_else(|| "<none>".to_string(), |ninja| ninja.borrow().name.clone())
}
