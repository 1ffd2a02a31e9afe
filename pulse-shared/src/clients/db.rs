use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

/// Postgres pool for one gateway instance. `max_size` comes from
/// configuration so instances can be sized to their connection budget;
/// checked-out connections are verified so a dropped backend surfaces at
/// checkout instead of mid-transaction.
pub fn create_pool(database_url: &str, max_size: u32) -> DbPool {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = Pool::builder()
        .max_size(max_size)
        .test_on_check_out(true)
        .build(manager)
        .expect("failed to create database pool");

    tracing::info!(max_size, "postgres pool ready");
    pool
}
