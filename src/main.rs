#![deny(rust_2018_idioms)]
#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]

use std::process::exit;

mod cli;

fn main() {
    if let Err(e) = cli::exec(cli::from_args()) {
        eprintln!("Error: {:#}", e);
        exit(1);
    }
}
