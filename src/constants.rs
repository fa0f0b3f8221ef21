/// 기본 Flashbots 릴레이
pub const DEFAULT_FLASHBOTS_RELAY: &str = "https://relay.flashbots.net";

/// 보조 릴레이 (Eden Network)
pub const DEFAULT_EDEN_RELAY: &str = "https://api.edennetwork.io/v1/bundle";

/// 가스 데이터 조회 실패 시 사용하는 보수적 가스 가격 (20 gwei)
pub const FALLBACK_GAS_PRICE_WEI: u64 = 20_000_000_000;

/// 가스 가격 하한 (1 gwei)
pub const MIN_GAS_PRICE_WEI: u64 = 1_000_000_000;

/// 통계 분석에 필요한 최소 가스 샘플 수
pub const MIN_GAS_SAMPLES: usize = 10;

/// fast 티어에 적용하는 상향 버퍼 (5%)
pub const FAST_TIER_BUFFER_PCT: u64 = 5;

/// 중복 제거 집합 기본 용량
pub const DEDUP_CAPACITY: usize = 10_000;

/// 분류 배치 기본 크기
pub const CLASSIFY_BATCH_SIZE: usize = 20;

// 기본 감시 대상 DEX 라우터들
pub const UNISWAP_V2_ROUTER: &str = "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D";
pub const UNISWAP_V3_ROUTER: &str = "0xE592427A0AEce92De3Edee1F18E0157C05861564";
pub const SUSHISWAP_ROUTER: &str = "0xd9e1cE17f2641f24aE83637ab66a2cca9C378B9F";

/// 기본 감시 라우터 주소 목록
pub fn dex_router_addresses() -> Vec<alloy::primitives::Address> {
    [UNISWAP_V2_ROUTER, UNISWAP_V3_ROUTER, SUSHISWAP_ROUTER]
        .iter()
        .map(|addr| addr.parse().expect("hardcoded router address is valid"))
        .collect()
}

// 자주 감시하는 스왑/전송 함수 선택자들
pub const SELECTOR_SWAP_EXACT_TOKENS_FOR_TOKENS: [u8; 4] = [0x38, 0xed, 0x17, 0x39];
pub const SELECTOR_SWAP_TOKENS_FOR_EXACT_TOKENS: [u8; 4] = [0x88, 0x03, 0xdb, 0xee];
pub const SELECTOR_SWAP_EXACT_ETH_FOR_TOKENS: [u8; 4] = [0x7f, 0xf3, 0x6a, 0xb5];
pub const SELECTOR_TRANSFER: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];
pub const SELECTOR_TRANSFER_FROM: [u8; 4] = [0x23, 0xb8, 0x72, 0xdd];
