// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license
use crate::patterns::PatternError;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::pooled_connection::ManagerConfig;
use diesel_async::pooled_connection::RecyclingMethod;
use diesel_async::pooled_connection::bb8::Pool;
use std::env;

/// This type alias is the pool, which can be quried for connections.
/// It is typically wrapped in Arc to allow thread safe cloning to the same pool
pub type CatenaryPostgresPool =
    bb8::Pool<AsyncDieselConnectionManager<diesel_async::AsyncPgConnection>>;

/// Type alias to the pooled connection
/// This must be used in a single thread, since it is mutable
pub type CatenaryConn<'a> = &'a mut bb8::PooledConnection<
    'a,
    diesel_async::pooled_connection::AsyncDieselConnectionManager<diesel_async::AsyncPgConnection>,
>;

pub async fn make_async_pool() -> Result<CatenaryPostgresPool, Box<dyn std::error::Error + Sync + Send>>
{
    let mut custom_conf = ManagerConfig::default();

    custom_conf.recycling_method = RecyclingMethod::Fast;

    // one transaction per command, a handful of connections is plenty
    let config: AsyncDieselConnectionManager<diesel_async::AsyncPgConnection> =
        AsyncDieselConnectionManager::<diesel_async::AsyncPgConnection>::new_with_config(
            database_url_for_env()?,
            custom_conf,
        );
    let pool = Pool::builder()
        .max_size(4)
        .min_idle(Some(1))
        .build(config)
        .await?;

    Ok(pool)
}

fn database_url_for_env() -> Result<String, Box<dyn std::error::Error + Sync + Send>> {
    env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".into())
}

/// A feed's Postgres schema name. Interpolated into SQL, so only ASCII
/// letters, digits and underscores are accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Namespace(String);

impl Namespace {
    pub fn new(namespace: &str) -> Result<Namespace, PatternError> {
        let valid = !namespace.is_empty()
            && !namespace.starts_with(|c: char| c.is_ascii_digit())
            && namespace
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');

        match valid {
            true => Ok(Namespace(namespace.to_string())),
            false => Err(PatternError::InvalidNamespace(namespace.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_rejects_sql() {
        assert_eq!(Namespace::new("feed_abc_123").unwrap().as_str(), "feed_abc_123");
        assert!(Namespace::new("").is_err());
        assert!(Namespace::new("1feed").is_err());
        assert!(Namespace::new("feed; DROP TABLE trips").is_err());
        assert!(Namespace::new("feed.trips").is_err());
    }
}
