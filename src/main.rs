use std::sync::Arc;

use mintforge::agent::{RunDriver, SessionManager, ToolDispatcher};
use mintforge::assistant::{AssistantBackend, AssistantSpec, OpenAiClient};
use mintforge::chain::{
    format_address, EvmRpcClient, LocalKeySigner, NftContract, PaymentContract, PaymentReads,
    TransactionSender, TransactionSigner,
};
use mintforge::credits::{ContractCreditReader, CreditReconciler, PinnedBlockCreditReader};
use mintforge::http::{create_router, AppState};
use mintforge::ipfs::PinningClient;
use mintforge::prompt::ASSISTANT_INSTRUCTIONS;
use mintforge::tools::{
    CheckPaymentTool, GenerateImageTool, GetBalanceTool, GetNftBalanceTool, GetWalletAddressTool,
    MintAndUploadTool, UseMintingCreditTool,
};
use mintforge::tracing::{init_tracing, shutdown_tracing};
use mintforge::{AppConfig, MintService};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    println!("[MINTFORGE] Loading configuration...");
    let config = AppConfig::from_env()?;
    init_tracing("mintforge", config.otlp_endpoint.as_deref())?;
    tracing::debug!(?config, "Configuration loaded");

    // ─── Chain ───
    let rpc = Arc::new(EvmRpcClient::new(config.rpc_url.clone(), config.http_timeout)?);
    let fallback_rpc = Arc::new(EvmRpcClient::new(
        config.fallback_rpc_url.clone(),
        config.http_timeout,
    )?);

    match rpc.chain_id().await {
        Ok(id) if id != config.chain_id => {
            tracing::warn!(expected = config.chain_id, actual = id, "RPC node reports a different chain id")
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Could not read chain id from RPC node"),
    }

    let signer: Arc<dyn TransactionSigner> = Arc::new(LocalKeySigner::from_hex(&config.private_key)?);
    let agent_wallet = signer.address();
    println!("[MINTFORGE] Agent wallet: {}", format_address(&agent_wallet));
    let sender = Arc::new(TransactionSender::new(rpc.clone(), signer, config.chain_id));

    let payment = Arc::new(
        PaymentContract::new(rpc.clone(), config.payment_contract).with_sender(sender.clone()),
    );
    let fallback_payment: Arc<dyn PaymentReads> =
        Arc::new(PaymentContract::new(fallback_rpc, config.payment_contract));
    let nft = Arc::new(NftContract::new(rpc.clone(), config.nft_contract, sender));

    // ─── Tools ───
    let openai = Arc::new(OpenAiClient::new(
        config.openai_base_url.clone(),
        config.openai_api_key.clone(),
        config.http_timeout,
    )?);
    let pinning = PinningClient::new(
        config.pinning_base_url.clone(),
        config.gateway_url.clone(),
        config.pinning_auth.clone(),
        config.http_timeout,
    )?;

    let dispatcher = ToolDispatcher::new()
        .with(Arc::new(GenerateImageTool::new(openai.clone(), config.image_model.clone())))
        .with(Arc::new(MintAndUploadTool::new(pinning, nft.clone())))
        .with(Arc::new(CheckPaymentTool::new(payment.clone())))
        .with(Arc::new(UseMintingCreditTool::new(payment.clone())))
        .with(Arc::new(GetBalanceTool::new(rpc)))
        .with(Arc::new(GetNftBalanceTool::new(nft)))
        .with(Arc::new(GetWalletAddressTool::new(agent_wallet)));

    // ─── Agent ───
    let spec = AssistantSpec {
        model: config.assistant_model.clone(),
        name: "NFT Minting Agent".to_string(),
        instructions: ASSISTANT_INSTRUCTIONS.to_string(),
        tools: dispatcher.definitions(),
    };
    let backend: Arc<dyn AssistantBackend> = openai;
    let sessions = Arc::new(match config.assistant_id.clone() {
        Some(id) => SessionManager::with_assistant_id(backend.clone(), spec, id),
        None => SessionManager::new(backend.clone(), spec),
    });
    let driver = Arc::new(RunDriver::new(
        backend,
        Arc::new(dispatcher),
        config.driver.clone(),
    ));

    // ─── Credits ───
    let primary_reads: Arc<dyn PaymentReads> = payment;
    let reconciler = Arc::new(CreditReconciler::new(
        Arc::new(ContractCreditReader::new(primary_reads.clone())),
        Arc::new(PinnedBlockCreditReader::new(fallback_payment.clone())),
        config.reconcile.clone(),
    ));

    let service = Arc::new(MintService::new(sessions, driver, reconciler));
    let router = create_router(AppState {
        mint: service,
        payment: primary_reads,
        fallback_payment,
        payment_address: config.payment_contract,
    });

    let listener = TcpListener::bind(config.bind_addr).await?;
    println!("--------------------------------------------------");
    println!("  MINTFORGE listening on http://{}", config.bind_addr);
    println!("  NFT contract:     {}", format_address(&config.nft_contract));
    println!("  Payment contract: {}", format_address(&config.payment_contract));
    println!("--------------------------------------------------");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for shutdown signal");
            }
            println!("[MINTFORGE] Shutting down...");
        })
        .await?;

    shutdown_tracing();
    Ok(())
}
