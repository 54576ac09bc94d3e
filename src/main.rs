// Entry point of the utxo-chain binary: parse arguments, resolve the
// configuration and run one ledger command against the sled store.
use clap::Parser;
use data_encoding::HEXLOWER;
use log::{error, info, LevelFilter};
use std::process;
use utxo_chain::{
    convert_address, hash_pub_key, validate_address, Blockchain, Command, Config, Lock, Opt,
    ProofOfWork, Transaction, Wallets,
};

fn main() {
    // RUST_LOG still overrides the default level
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let opt = Opt::parse();

    if let Err(e) = run(opt) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run(opt: Opt) -> Result<(), Box<dyn std::error::Error>> {
    let config = opt.resolve_config()?;
    run_command(opt.command, &config)
}

fn open_chain(config: &Config) -> Result<Blockchain, Box<dyn std::error::Error>> {
    let pow = ProofOfWork::new(config.difficulty)?;
    Ok(Blockchain::open_with_path(config.blocks_path(), pow)?)
}

fn run_command(command: Command, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Createblockchain { address } => {
            if !validate_address(&address) {
                return Err(format!("Invalid address: {address}").into());
            }
            let pow = ProofOfWork::new(config.difficulty)?;
            let blockchain =
                Blockchain::create_blockchain_with_path(config.blocks_path(), pow, &address)?;
            blockchain.get_store().flush()?;
            println!("Done!");
        }
        Command::Createwallet => {
            let mut wallets = Wallets::load(&config.wallet_file)?;
            let address = wallets.create_wallet()?;
            println!("Your new address: {address}")
        }
        Command::GetBalance { address } => {
            let owner = Lock::from_address(&address)?;
            let blockchain = open_chain(config)?;
            let balance = blockchain.get_balance(&owner)?;
            println!("Balance of {address}: {balance}");
        }
        Command::ListAddresses => {
            let wallets = Wallets::load(&config.wallet_file)?;
            for address in wallets.get_addresses() {
                println!("{address}")
            }
        }
        Command::Send { from, to, amount } => {
            if !validate_address(&from) {
                return Err(format!("Invalid sender address: {from}").into());
            }
            if !validate_address(&to) {
                return Err(format!("Invalid recipient address: {to}").into());
            }
            if amount == 0 {
                return Err("Amount must be positive".into());
            }

            let wallets = Wallets::load(&config.wallet_file)?;
            let wallet = wallets
                .get_wallet(&from)
                .ok_or_else(|| format!("No local wallet for address: {from}"))?;
            let blockchain = open_chain(config)?;

            let transaction = Transaction::new_utxo_transaction(wallet, &to, amount, &blockchain)?;
            let block = blockchain.add_block(&[transaction])?;
            blockchain.get_store().flush()?;
            info!("Transaction mined into block {}", block.get_hash_hex());
            println!("Success!")
        }
        Command::Printchain => {
            let blockchain = open_chain(config)?;
            for block in blockchain.iterator() {
                let block = block?;
                println!("Pre block hash: {}", HEXLOWER.encode(block.get_pre_block_hash()));
                println!("Cur block hash: {}", block.get_hash_hex());
                println!("Nonce: {}", block.get_nonce());
                println!("PoW valid: {}", blockchain.get_pow().validate(&block));

                for tx in block.get_transactions() {
                    println!("- Transaction txid_hex: {}", tx.get_id_hex());
                    if tx.is_coinbase() {
                        println!(
                            "-- Coinbase data = {}",
                            String::from_utf8_lossy(tx.get_vin()[0].get_signature())
                        );
                    } else {
                        for input in tx.get_vin() {
                            println!(
                                "-- Input txid = {}, vout = {}, from = {}",
                                HEXLOWER.encode(input.get_txid()),
                                input.get_vout(),
                                convert_address(&hash_pub_key(
                                    input.get_pub_key()
                                )),
                            )
                        }
                    }
                    for output in tx.get_vout() {
                        println!(
                            "-- Output value = {}, to = {}",
                            output.get_value(),
                            output.get_lock()
                        )
                    }
                }
                println!()
            }
        }
        Command::Audit => {
            let blockchain = open_chain(config)?;
            let count = blockchain.audit()?;
            println!("Chain is valid: {count} blocks checked");
        }
    }
    Ok(())
}
