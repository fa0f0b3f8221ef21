use serde_json::{json, Value};

use crate::types::{PipelineError, SignedBundle};

/// eth_sendBundle 요청 본문 생성
///
/// 본문 구조는 모든 릴레이에 동일하며 서명 헤더만 엔드포인트별로 붙는다.
pub fn send_bundle_body(bundle: &SignedBundle) -> Result<Value, PipelineError> {
    validate_raw_txs(&bundle.raw_txs)?;

    Ok(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "eth_sendBundle",
        "params": [{
            "txs": bundle.raw_txs,
            "blockNumber": format!("0x{:x}", bundle.target_block),
            "minTimestamp": 0,
            "maxTimestamp": u32::MAX,
            "revertingTxHashes": []
        }]
    }))
}

/// eth_callBundle 시뮬레이션 요청 본문 생성
pub fn call_bundle_body(raw_txs: &[String], block_number: u64) -> Result<Value, PipelineError> {
    validate_raw_txs(raw_txs)?;

    Ok(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "eth_callBundle",
        "params": [{
            "txs": raw_txs,
            "blockNumber": format!("0x{:x}", block_number),
            "stateBlockNumber": "latest"
        }]
    }))
}

/// 번들 구성 검증
///
/// 제출 경로에서 호출자에게 오류로 올라가는 유일한 실패 지점이다.
/// 릴레이 응답 오류는 엔드포인트별 결과로만 기록된다.
fn validate_raw_txs(raw_txs: &[String]) -> Result<(), PipelineError> {
    if raw_txs.is_empty() {
        return Err(PipelineError::Data(
            "bundle has no transactions".to_string(),
        ));
    }

    for tx in raw_txs {
        let Some(body) = tx.strip_prefix("0x") else {
            return Err(PipelineError::Data(format!(
                "raw transaction is not 0x-prefixed hex: {}",
                tx
            )));
        };
        if body.is_empty() || hex::decode(body).is_err() {
            return Err(PipelineError::Data(format!(
                "raw transaction is not valid hex: {}",
                tx
            )));
        }
    }
    Ok(())
}

/// 시뮬레이션 응답에서 파싱 가능한 revert 사유 추출
pub fn extract_revert_reason(response: &Value) -> Option<String> {
    if let Some(error) = response.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown relay error");
        return Some(message.to_string());
    }

    let results = response.get("result")?.get("results")?.as_array()?;
    for result in results {
        if let Some(error) = result.get("error").and_then(|e| e.as_str()) {
            return Some(match result.get("revert").and_then(|r| r.as_str()) {
                Some(revert) => format!("{}: {}", error, revert),
                None => error.to_string(),
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bundle() -> SignedBundle {
        SignedBundle::new(
            vec!["0x02f87301".to_string(), "0x02f87302".to_string()],
            19_230_001,
        )
    }

    #[test]
    fn test_send_bundle_body_shape() {
        let body = send_bundle_body(&sample_bundle()).unwrap();

        assert_eq!(body["method"], "eth_sendBundle");
        let params = &body["params"][0];
        assert_eq!(params["txs"].as_array().unwrap().len(), 2);
        // 목표 블록은 정확히 하나이며 hex로 인코딩된다
        assert_eq!(params["blockNumber"], format!("0x{:x}", 19_230_001));
        assert_eq!(params["minTimestamp"], 0);
    }

    #[test]
    fn test_call_bundle_body_shape() {
        let body = call_bundle_body(&["0xdeadbeef".to_string()], 19_230_000).unwrap();
        assert_eq!(body["method"], "eth_callBundle");
        assert_eq!(body["params"][0]["stateBlockNumber"], "latest");
    }

    #[test]
    fn test_empty_bundle_rejected() {
        let bundle = SignedBundle::new(vec![], 19_230_001);
        let err = send_bundle_body(&bundle).unwrap_err();
        assert!(matches!(err, PipelineError::Data(_)));
    }

    #[test]
    fn test_malformed_tx_rejected() {
        let bundle = SignedBundle::new(vec!["not-hex".to_string()], 19_230_001);
        assert!(send_bundle_body(&bundle).is_err());

        let bundle = SignedBundle::new(vec!["0xzz".to_string()], 19_230_001);
        assert!(send_bundle_body(&bundle).is_err());
    }

    #[test]
    fn test_extract_revert_reason_from_results() {
        let response = serde_json::json!({
            "result": {
                "results": [
                    {"txHash": "0x1", "gasUsed": 21000},
                    {"txHash": "0x2", "error": "execution reverted", "revert": "UniswapV2: K"}
                ]
            }
        });
        assert_eq!(
            extract_revert_reason(&response).unwrap(),
            "execution reverted: UniswapV2: K"
        );
    }

    #[test]
    fn test_extract_revert_reason_from_top_level_error() {
        let response = serde_json::json!({
            "error": {"code": -32000, "message": "bundle rejected"}
        });
        assert_eq!(extract_revert_reason(&response).unwrap(), "bundle rejected");
    }

    #[test]
    fn test_no_revert_reason_on_success() {
        let response = serde_json::json!({
            "result": {"results": [{"txHash": "0x1", "gasUsed": 21000}]}
        });
        assert!(extract_revert_reason(&response).is_none());
    }
}
