use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::core::utils::keccak256;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::H256;
use serde_json::Value;

/// 릴레이 HTTP 전송 seam
///
/// 실제 구현은 reqwest, 테스트는 가짜 전송으로 대체한다.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    async fn post(&self, url: &str, body: String, signature: String) -> Result<Value>;
}

/// reqwest 기반 릴레이 전송
pub struct HttpRelayTransport {
    client: reqwest::Client,
}

impl HttpRelayTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RelayTransport for HttpRelayTransport {
    async fn post(&self, url: &str, body: String, signature: String) -> Result<Value> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("X-Flashbots-Signature", signature)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("relay returned status {}: {}", status, text));
        }

        Ok(response.json().await?)
    }
}

/// 요청 본문에 대한 X-Flashbots-Signature 헤더 값 생성
///
/// 본문의 keccak 해시를 전용 인증 키로 서명한다. 이 키는 거래 지갑과
/// 분리된 identity이며 릴레이 평판에만 쓰인다.
pub fn flashbots_signature(body: &str, signing_key: &LocalWallet) -> Result<String> {
    let message_hash = keccak256(body.as_bytes());
    let signature = signing_key.sign_hash(H256::from(message_hash))?;

    Ok(format!(
        "0x{:x}:0x{}",
        signing_key.address(),
        hex::encode(signature.to_vec())
    ))
}
