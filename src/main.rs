//! # tickos CLI
//!
//! Runs the demo scenarios: `tickos <1-8|all>`. With no argument the
//! scenario menu is printed; an unknown argument prints the menu to
//! stderr and exits with status 1.

use std::process;

use clap::Parser;

use tickos::scenarios;

/// Simulated RTOS scheduler — priority inheritance demo.
#[derive(Parser)]
#[command(name = "tickos", version, about)]
struct Cli {
    /// Scenario to run: 1-8, or "all" for every scenario in order.
    scenario: Option<String>,
}

fn print_menu() {
    println!();
    println!("{}", "=".repeat(64));
    println!("  tickos — RTOS Task Scheduler / Priority Inheritance Demo");
    println!("{}", "=".repeat(64));
    println!();
    println!("Usage: tickos [scenario]");
    println!();
    println!("  Scenarios:");
    println!("    1   - Basic Priority Scheduling");
    println!("    2   - Preemption");
    println!("    3   - Priority Inversion WITH PI  (the killer demo)");
    println!("    4   - Priority Inversion WITHOUT PI (comparison)");
    println!("    5   - Transitive Priority Inheritance");
    println!("    6   - Rate Monotonic Scheduling");
    println!("    7   - Semaphore Producer-Consumer");
    println!("    8   - Deadline Miss Detection");
    println!("    all - Run all scenarios");
    println!();
    println!("  Example:");
    println!("    tickos 3      # Run the priority inheritance demo");
    println!("    tickos all    # Run everything");
    println!();
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let Some(scenario) = cli.scenario else {
        print_menu();
        return;
    };

    match scenario.as_str() {
        "all" => {
            scenarios::run_all();
        }
        "1" => {
            scenarios::basic_priority();
        }
        "2" => {
            scenarios::preemption();
        }
        "3" => {
            scenarios::inversion_with_pi();
        }
        "4" => {
            scenarios::inversion_without_pi();
        }
        "5" => {
            scenarios::transitive_pi();
        }
        "6" => {
            scenarios::rate_monotonic();
        }
        "7" => {
            scenarios::semaphore_producer_consumer();
        }
        "8" => {
            scenarios::deadline_miss();
        }
        other => {
            eprintln!("Unknown scenario: {other}");
            print_menu();
            process::exit(1);
        }
    }
}
