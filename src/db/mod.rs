pub mod memory;
pub mod models;
pub mod pg;
pub mod repository;
pub mod schema;

use diesel_async::pooled_connection::deadpool::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;

pub use memory::{FaultPoint, MemoryRepository};
pub use pg::PgRepository;
pub use repository::{RepoError, RepoResult, Repository};

pub type DbPool = deadpool::managed::Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

pub fn create_pool(database_url: &str, max_size: usize) -> Result<DbPool, RepoError> {
    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    Pool::builder(config)
        .max_size(max_size)
        .build()
        .map_err(|e| RepoError::Pool(e.to_string()))
}
