//! # BGPd RIB CLI
//!
//! Loads the peers and static routes of a config file into the RIB, runs
//! best path selection and export, then prints the resulting tables.
//!
//! ```sh
//! $ bgpd demos/config.toml show loc-rib
//! IPv4 Unicast
//!  Prefix           Best From  Next Hop  Age       Origin      Local Pref  Metric  IGP Metric  AS Path  Communities
//! ----------------------------------------------------------------------------------------------------------------------
//!  192.168.10.0/24  10.0.0.3   10.0.0.3  00:00:00  IGP         200                 5
//!  192.168.20.0/24  10.0.0.2   10.0.0.2  00:00:00  Incomplete                                  100 200
//! ```
//!
//! Learned (Adj-RIB-In) and advertised (Adj-RIB-Out) routes can be
//! filtered by peer router id:
//! ```sh
//! $ bgpd demos/config.toml show advertised 10.0.0.2
//! $ bgpd demos/config.toml show learned --json
//! ```

use std::error::Error;
use std::sync::Arc;

use clap::Parser;
use colored::*;
use itertools::Itertools;
use log::{debug, info};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::{self, ServerConfig};
use crate::error::Result;
use crate::rib::{Family, Rib, RouterId, StaticIgpMetrics};
use crate::utils::parse_route_spec;

mod display;
mod table;

use display::{AdvertisedRouteRow, LearnedRouteRow, LocRibRow};
use table::{OutputTable, ToRow};

#[derive(Parser, Debug)]
#[clap(name = "bgpd", rename_all = "kebab-case")]
/// Load configured peers and routes into the BGP RIB and show the result
pub struct Args {
    /// Path to BGP service config.toml
    pub config_path: String,
    #[clap(subcommand)]
    pub cmd: Command,
    /// Print JSON instead of tables
    #[clap(long, global = true)]
    pub json: bool,
    /// Show debug logs (additive for trace logs)
    #[clap(short, parse(from_occurrences), global = true)]
    pub verbose: u8,
}

#[derive(Parser, Debug)]
#[clap(rename_all = "kebab-case")]
pub enum Command {
    #[clap(alias = "s", subcommand)]
    /// View RIB contents
    Show(Show),
}

#[derive(Parser, Debug)]
#[clap(rename_all = "kebab-case")]
pub enum Show {
    /// Selected best path of every destination
    #[clap(alias = "l")]
    LocRib,
    /// Routes received from peers, after import policy
    #[clap(alias = "r")]
    Learned(RouteOptions),
    /// Routes advertised to peers, after export policy
    #[clap(alias = "a")]
    Advertised(RouteOptions),
}

#[derive(Parser, Debug)]
#[clap(rename_all = "kebab-case")]
pub struct RouteOptions {
    /// Router ID of the peer to filter routes
    #[clap()]
    peer: Option<RouterId>,
}

/// Register every enabled peer and announce its static routes, then wait
/// for selection and export to settle
pub async fn load(config: &ServerConfig) -> Result<Rib> {
    let igp = Arc::new(StaticIgpMetrics::from_config(config));
    let rib = Rib::new(config, igp, CancellationToken::new());
    let peers: Vec<_> = config.peers.iter().filter(|peer| peer.enabled).collect();
    for peer in &peers {
        rib.register_peer(peer.router_id, peer.role, peer.aigp, peer.families.clone())?;
    }
    let mut announced = 0;
    for peer in &peers {
        for spec in &peer.static_routes {
            let (family, prefix, attributes) = parse_route_spec(spec)?;
            if rib.announce(peer.router_id, family, prefix, Arc::new(attributes))? {
                announced += 1;
            }
        }
    }
    rib.flush().await?;
    info!(
        "Loaded {} peers ({} disabled) and {} routes",
        peers.len(),
        config.peers.len() - peers.len(),
        announced
    );
    Ok(rib)
}

fn print_grouped<T>(rows: Vec<(Family, String, T)>, json: bool) -> std::result::Result<(), Box<dyn Error>>
where
    T: ToRow + Serialize,
{
    let mut rows = rows;
    rows.sort_by(|a, b| (a.0.to_string(), &a.1).cmp(&(b.0.to_string(), &b.1)));
    if json {
        let rows: Vec<&T> = rows.iter().map(|(_, _, row)| row).collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    for (family, rows) in &rows.into_iter().group_by(|(family, _, _)| *family) {
        println!("{}", family);
        let mut table = OutputTable::new();
        for (_, _, row) in rows {
            table.add_row(&row);
        }
        table.print();
        println!();
    }
    Ok(())
}

fn show(rib: &Rib, show: &Show, json: bool) -> std::result::Result<(), Box<dyn Error>> {
    match show {
        Show::LocRib => {
            let rows = rib
                .loc_rib()
                .routes()
                .into_iter()
                .map(|(family, prefix, route)| {
                    (family, prefix.to_string(), LocRibRow::new(family, prefix, &route))
                })
                .collect();
            print_grouped(rows, json)
        }
        Show::Learned(options) => {
            let rows = rib
                .learned_routes(options.peer)
                .into_iter()
                .map(|(family, prefix, peer, route)| {
                    (
                        family,
                        prefix.to_string(),
                        LearnedRouteRow::new(family, prefix, peer, &route),
                    )
                })
                .collect();
            print_grouped(rows, json)
        }
        Show::Advertised(options) => {
            let rows = rib
                .adj_ribs_out()
                .routes(options.peer)
                .into_iter()
                .map(|(peer, family, prefix, route)| {
                    (
                        family,
                        prefix.to_string(),
                        AdvertisedRouteRow::new(family, prefix, peer, &route),
                    )
                })
                .collect();
            print_grouped(rows, json)
        }
    }
}

async fn run_cmd(args: &Args) -> std::result::Result<(), Box<dyn Error>> {
    let config = config::from_file(&args.config_path)?;
    debug!("Found {} peers in {}", config.peers.len(), args.config_path);
    let rib = load(&config).await?;
    let result = match &args.cmd {
        Command::Show(options) => show(&rib, options, args.json),
    };
    let stats = rib.shutdown().await;
    debug!("Selection finished: {:?}", stats);
    result
}

/// Run the requested command, printing any error
pub async fn run(args: &Args) -> bool {
    match run_cmd(args).await {
        Ok(()) => true,
        Err(err) => {
            eprintln!("{}", err.to_string().red());
            false
        }
    }
}
