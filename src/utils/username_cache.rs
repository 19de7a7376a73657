use anyhow::Result;
use futures_util::StreamExt;
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::time::Duration;

/// Lower-cased usernames known to be taken.
static USERNAME_CACHE: Lazy<Cache<String, ()>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(100_000)
        .time_to_live(Duration::from_secs(86400)) // 24h TTL
        .build()
});

pub async fn mark_taken(username: &str) {
    USERNAME_CACHE.insert(username.to_lowercase(), ()).await;
}

pub async fn is_taken(username: &str) -> bool {
    USERNAME_CACHE.contains_key(&username.to_lowercase())
}

/// Load usernames that logged in recently (batched)
pub async fn warmup_username_cache(pool: &MySqlPool, days: u32, batch_size: usize) -> Result<()> {
    let mut stream = sqlx::query_as::<_, (String,)>(
        r#"
        SELECT username
        FROM users
        WHERE last_login_at >= NOW() - INTERVAL ? DAY
        ORDER BY last_login_at DESC
        "#,
    )
    .bind(days)
    .fetch(pool);

    let mut batch = Vec::with_capacity(batch_size);
    let mut total_count = 0usize;

    while let Some(row) = stream.next().await {
        let (username,) = row?;
        batch.push(username);
        total_count += 1;

        if batch.len() >= batch_size {
            futures::future::join_all(batch.iter().map(|u| mark_taken(u))).await;
            batch.clear();
        }
    }

    if !batch.is_empty() {
        futures::future::join_all(batch.iter().map(|u| mark_taken(u))).await;
    }

    tracing::info!(total = total_count, days, "Username cache warmup complete");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn taken_names_are_case_insensitive() {
        mark_taken("Cashier.Mary").await;
        assert!(is_taken("cashier.mary").await);
        assert!(!is_taken("cashier.john").await);
    }
}
