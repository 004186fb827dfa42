use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use secrecy::SecretString;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// 平文トークンのバイト長
const TOKEN_BYTES: usize = 32;
/// クライアントIDのバイト長
const CLIENT_ID_BYTES: usize = 16;

fn random_url_safe(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// 32バイトのランダムトークンを生成（URL-safe Base64）
pub fn generate_token() -> SecretString {
    SecretString::from(random_url_safe(TOKEN_BYTES))
}

/// クライアントIDを生成
pub fn generate_client_id() -> String {
    random_url_safe(CLIENT_ID_BYTES)
}

/// トークンをSHA256でハッシュ化
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// 平文トークンと保存済みハッシュを定数時間で比較
pub fn verify_token(token: &str, stored_hash: &str) -> bool {
    let candidate = hash_token(token);
    candidate.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}
