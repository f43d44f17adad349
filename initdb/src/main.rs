//! Applies the annotation store's migrations to the configured database.

use std::env;

use movine::Movine;
use postgres::{Client, NoTls};

use log::{debug, info, initialize_logger, parse_level};

fn main() {
    dotenv::dotenv().ok();

    let level = env::var("BACKEND_LOG_LEVEL").ok();
    let logger = initialize_logger(parse_level(level.as_deref()));
    let connection_string = env::var("BACKEND_DB_CONNECTION_STRING")
        .expect("could not read BACKEND_DB_CONNECTION_STRING");
    let migration_dir =
        env::var("BACKEND_MIGRATION_DIR").unwrap_or_else(|_| "./migrations".to_owned());

    debug!(logger, "Connecting to database...");

    let client = Client::connect(&connection_string, NoTls).expect("could not connect to database");

    let mut movine = Movine::new(client);
    movine.set_migration_dir(&migration_dir);

    if movine.status().is_err() {
        debug!(logger, "Initializing movine...");
        movine.initialize().expect("failed to initialize movine")
    }

    debug!(logger, "Running migrations..."; "directory" => &migration_dir);
    movine.up().expect("failed to run migrations");

    info!(logger, "Videos, annotations and voice scripts are ready");
}
