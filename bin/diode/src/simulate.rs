//! `diode simulate`

use alloy_primitives::{Address, B256, U256};
use clap::Args;
use diode_config::RegistryConfig;
use diode_fleet::DeviceDetails;
use diode_registry::{
    spawn_registry_service, DiodeRegistry, InventoryOp, Operation, Receipt, RegistryEvent,
    RegistryHandle, SimulatedChain,
};
use diode_staking::ParticipantKind;
use diode_tickets::{
    encode_batch, ConnectionTicket, Ticket, TicketAnchor, TicketKind, TicketSigner, TrafficTicket,
};
use std::path::PathBuf;
use tracing::info;

const ONE: u128 = 1_000_000_000_000_000_000;

#[derive(Debug, Args)]
pub(crate) struct SimulateArgs {
    /// Whitelisted devices in the simulated fleet
    #[arg(long, default_value_t = 3)]
    devices: usize,

    /// Registry config, devnet when absent
    #[arg(long)]
    config: Option<PathBuf>,
}

fn log_receipt(step: &str, receipt: &Receipt) -> eyre::Result<()> {
    if receipt.events.is_empty() {
        info!(target: "diode::cli", step, height = receipt.height, "No events");
    }
    for event in &receipt.events {
        info!(target: "diode::cli", step, height = receipt.height, event = %serde_json::to_string(event)?, "Event");
    }
    Ok(())
}

async fn mine(handle: &RegistryHandle, count: u64) -> eyre::Result<()> {
    handle.apply(Operation::MineBlocks { count, coinbase: None }).await?;
    Ok(())
}

async fn log_stake(handle: &RegistryHandle, step: &str, who: ParticipantKind) -> eyre::Result<()> {
    let mut buckets = [U256::ZERO; 4];
    for (bucket, value) in (0u8..).zip(buckets.iter_mut()) {
        *value = handle.value(bucket, who).await?;
    }
    info!(
        target: "diode::cli",
        step,
        %who,
        confirmed = %buckets[0],
        pending = %buckets[1],
        locked = %buckets[2],
        claimable = %buckets[3],
        "Stake"
    );
    Ok(())
}

fn connection(
    signer: &TicketSigner,
    height: u64,
    hash: B256,
    fleet: Address,
    node: Address,
    total: u64,
) -> eyre::Result<Ticket> {
    let anchor = TicketAnchor::new(height, fleet, node);
    Ok(ConnectionTicket::sign(anchor, hash, U256::from(total), B256::ZERO, signer)?.into())
}

pub(crate) async fn run(args: SimulateArgs) -> eyre::Result<()> {
    let config = match &args.config {
        Some(path) => RegistryConfig::load(path)?,
        None => RegistryConfig::devnet(),
    };

    let miner = TicketSigner::from_seed("diode-simulate-miner")?.address();
    let owner = TicketSigner::from_seed("diode-simulate-owner")?.address();
    let devices = (0..args.devices.max(1))
        .map(|i| TicketSigner::from_seed(format!("diode-simulate-device-{i}")))
        .collect::<Result<Vec<_>, _>>()?;
    let client = TicketSigner::from_seed("diode-simulate-client")?;

    info!(target: "diode::cli", network = %config.network, %miner, devices = devices.len(), "Starting simulation");
    let registry = DiodeRegistry::new(config, SimulatedChain::new(miner))?;
    let (handle, task) = spawn_registry_service(registry);
    let who = ParticipantKind::Miner(miner);
    let one = U256::from(ONE);

    // Stake three times across the maturation window
    mine(&handle, 1).await?;
    for round in 0..3 {
        let receipt = handle.apply(Operation::MinerStake { caller: miner, amount: one }).await?;
        log_receipt("stake", &receipt)?;
        if round < 2 {
            mine(&handle, 3).await?;
        }
        log_stake(&handle, "stake", who).await?;
    }

    // Unstake a tenth, withdraw early then after the window
    mine(&handle, 3).await?;
    let tenth = U256::from(ONE / 10);
    log_receipt("unstake", &handle.apply(Operation::MinerUnstake { caller: miner, amount: tenth }).await?)?;
    log_receipt("withdraw", &handle.apply(Operation::MinerWithdraw { caller: miner }).await?)?;
    mine(&handle, 3).await?;
    log_receipt("withdraw", &handle.apply(Operation::MinerWithdraw { caller: miner }).await?)?;
    log_stake(&handle, "withdraw", who).await?;

    // Fleet with whitelisted devices and one client
    let receipt = handle.apply(Operation::CreateFleet { caller: owner, label: "simulation".into() }).await?;
    log_receipt("fleet", &receipt)?;
    let fleet = receipt
        .events
        .iter()
        .find_map(|event| match event {
            RegistryEvent::FleetCreated { fleet, .. } => Some(*fleet),
            _ => None,
        })
        .ok_or_else(|| eyre::eyre!("fleet creation emitted no event"))?;
    for device in &devices {
        let device = device.address();
        handle.apply(Operation::SetDeviceWhitelist { caller: owner, fleet, device, allowed: true }).await?;
        handle
            .apply(Operation::SetAccessWhitelist {
                caller: owner,
                fleet,
                device,
                client: client.address(),
                allowed: true,
            })
            .await?;
    }
    let details = DeviceDetails { name: "simulated-gateway".into(), ..Default::default() };
    let receipt = handle
        .apply(Operation::Inventory { caller: owner, fleet, action: InventoryOp::CreateDevice { details } })
        .await?;
    log_receipt("inventory", &receipt)?;
    mine(&handle, 1).await?;

    // Connection counters: new, duplicate, raised
    let snapshot = handle.snapshot();
    let height = snapshot.height - 1;
    let hash = snapshot.parent_hash.ok_or_else(|| eyre::eyre!("no sealed block to reference"))?;
    for total in [1, 1, 2] {
        let tickets = devices
            .iter()
            .map(|device| connection(device, height, hash, fleet, miner, total))
            .collect::<eyre::Result<Vec<_>>>()?;
        let words = encode_batch(&tickets);
        let receipt =
            handle.apply(Operation::SubmitTickets { kind: TicketKind::Connection, words }).await?;
        log_receipt("connection", &receipt)?;
    }

    // Traffic from a device outside the whitelist is dropped
    let stranger = TicketSigner::from_seed("diode-simulate-stranger")?;
    let anchor = TicketAnchor::new(height, fleet, miner);
    let traffic: Ticket =
        TrafficTicket::sign(anchor, hash, U256::from(4_096), B256::ZERO, &stranger, &client)?.into();
    let receipt = handle
        .apply(Operation::SubmitTickets { kind: TicketKind::Traffic, words: traffic.to_words() })
        .await?;
    log_receipt("traffic", &receipt)?;

    log_receipt("reward", &handle.apply(Operation::BlockReward).await?)?;
    log_stake(&handle, "reward", who).await?;

    handle.shutdown().await?;
    let registry = task.await?;
    info!(
        target: "diode::cli",
        height = registry.height(),
        events = registry.events().len(),
        pool = %registry.reward_pool(),
        "Simulation finished"
    );
    Ok(())
}
