//! Operator command line tool.
//!
//! Sends a single control message to the vehicle and prints the outcome:
//!
//! ```text
//! ctl_cmd enable
//! ctl_cmd disable
//! ctl_cmd ping
//! ```

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use structopt::StructOpt;

// Internal
use comms_if::ctl::{CtlMsg, PING_ACK};
use comms_if::net::{ctl::send_msg, NetParams};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Send a control message to the vehicle.
#[derive(Debug, StructOpt)]
#[structopt(name = "ctl_cmd")]
struct Opt {
    /// Override the vehicle's control endpoint (defaults to net.toml).
    #[structopt(long)]
    endpoint: Option<String>,

    /// The command to send.
    #[structopt(subcommand)]
    cmd: Cmd,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
enum Cmd {
    /// Enable the vehicle's actuation subsystem.
    Enable,

    /// Disable the vehicle's actuation subsystem.
    Disable,

    /// Probe whether the vehicle is reachable and listening.
    Ping,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    let endpoint = match opt.endpoint {
        Some(e) => e,
        None => {
            let net_params: NetParams =
                util::params::load("net.toml").wrap_err("Could not load net params")?;
            net_params.ctl_endpoint()
        }
    };

    let msg = match opt.cmd {
        Cmd::Enable => CtlMsg::Enable,
        Cmd::Disable => CtlMsg::Disable,
        Cmd::Ping => CtlMsg::Ping,
    };

    let ack = send_msg(&endpoint, msg).wrap_err("Could not reach the vehicle")?;

    match (msg, ack) {
        (CtlMsg::Ping, Some(ref a)) if a == PING_ACK => {
            println!("vehicle is up");
        }
        (CtlMsg::Ping, other) => {
            return Err(eyre!("unexpected ping response: {:?}", other));
        }
        (m, _) => {
            println!("{} sent", m.as_token());
        }
    }

    Ok(())
}
