use crate::config::ResourceType;
use crate::error::AppError;
use crate::models::Resource;
use crate::repositories::ResourceStore;

const EMAIL_KEY: &str = "email";

/// リソース種別の設定に従ってメールアドレスを正規化
pub fn normalize_email(resource_type: &ResourceType, email: &str) -> String {
    let email = if resource_type.strips_whitespace(EMAIL_KEY) {
        email.trim()
    } else {
        email
    };

    if resource_type.is_case_insensitive(EMAIL_KEY) {
        email.to_lowercase()
    } else {
        email.to_string()
    }
}

/// メールアドレスからリソースを解決
///
/// 見つからない場合は `Ok(None)`。確認状態は評価しない（呼び出し側の判断）。
pub async fn find_by_email(
    store: &dyn ResourceStore,
    resource_type: &ResourceType,
    email: &str,
) -> Result<Option<Resource>, AppError> {
    let normalized = normalize_email(resource_type, email);
    store
        .find_by_email(
            &resource_type.name,
            &normalized,
            resource_type.is_case_insensitive(EMAIL_KEY),
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewResource;
    use crate::repositories::MemoryResourceStore;

    fn store_with(email: &str) -> MemoryResourceStore {
        let store = MemoryResourceStore::new();
        store
            .insert(
                NewResource {
                    resource_type: "user".to_string(),
                    email: email.to_string(),
                    password_hash: None,
                    confirmed_at: None,
                },
                false,
            )
            .unwrap();
        store
    }

    #[test]
    fn test_normalize_email() {
        let user = ResourceType::new("user", "auth");
        assert_eq!(normalize_email(&user, "  User@Example.COM "), "user@example.com");

        let strict = ResourceType {
            case_insensitive_keys: vec![],
            strip_whitespace_keys: vec![],
            ..ResourceType::new("user", "auth")
        };
        assert_eq!(normalize_email(&strict, " User@Example.com"), " User@Example.com");
    }

    #[tokio::test]
    async fn test_case_insensitive_lookup_finds_any_variant() {
        let store = store_with("user@example.com");
        let user = ResourceType::new("user", "auth");

        for variant in ["user@example.com", "USER@EXAMPLE.COM", "User@Example.com"] {
            assert!(find_by_email(&store, &user, variant).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_case_sensitive_lookup_requires_exact_case() {
        let store = store_with("user@example.com");
        let strict = ResourceType {
            case_insensitive_keys: vec![],
            ..ResourceType::new("user", "auth")
        };

        assert!(
            find_by_email(&store, &strict, "user@example.com")
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            find_by_email(&store, &strict, "USER@EXAMPLE.COM")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_lookup_is_scoped_by_resource_type() {
        let store = store_with("user@example.com");
        let mang = ResourceType::new("mang", "mangs");
        assert!(
            find_by_email(&store, &mang, "user@example.com")
                .await
                .unwrap()
                .is_none()
        );
    }
}
