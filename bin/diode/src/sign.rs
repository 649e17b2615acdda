//! `diode sign-ticket`

use alloy_primitives::{Address, B256, U256};
use clap::Args;
use diode_tickets::{ConnectionTicket, Ticket, TicketAnchor, TicketSigner};
use tracing::info;

#[derive(Debug, Args)]
pub(crate) struct SignTicketArgs {
    /// Hex secret key of the device
    #[arg(long, env = "DIODE_DEVICE_KEY", conflicts_with = "seed")]
    key: Option<String>,

    /// Derive the device key from a seed instead
    #[arg(long)]
    seed: Option<String>,

    /// Referenced block height
    #[arg(long)]
    height: u64,

    /// Hash of the referenced block
    #[arg(long)]
    block_hash: B256,

    /// Fleet of the device
    #[arg(long)]
    fleet: Address,

    /// Relaying node
    #[arg(long)]
    node: Address,

    /// Cumulative connection counter
    #[arg(long)]
    connections: U256,

    /// Device local address word
    #[arg(long, default_value_t = B256::ZERO)]
    local_address: B256,
}

pub(crate) fn run(args: SignTicketArgs) -> eyre::Result<()> {
    let signer = match (&args.key, &args.seed) {
        (Some(key), _) => TicketSigner::from_hex(key)?,
        (None, Some(seed)) => TicketSigner::from_seed(seed)?,
        (None, None) => eyre::bail!("either --key or --seed is required"),
    };

    let anchor = TicketAnchor::new(args.height, args.fleet, args.node);
    let ticket: Ticket =
        ConnectionTicket::sign(anchor, args.block_hash, args.connections, args.local_address, &signer)?.into();

    info!(target: "diode::cli", device = %signer.address(), height = args.height, "Connection ticket signed");
    for word in ticket.to_words() {
        println!("{word}");
    }
    Ok(())
}
