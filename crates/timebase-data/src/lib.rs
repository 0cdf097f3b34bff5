//! 프로바이더 카탈로그와 과거 데이터 관리.
//!
//! 이 crate는 다음을 제공합니다:
//! - 저장소 인터페이스 (`ProviderStore`, `PointStore`)
//! - PostgreSQL 저장소 및 인메모리 저장소
//! - 프로바이더 카탈로그 (등록, 활성화, capability 캐시)
//! - 과거 데이터 코디네이터 (저장소 우선, 프로바이더 폴백, write-back 캐시)

pub mod catalog;
pub mod coordinator;
pub mod error;
pub mod storage;

pub use catalog::{ProviderCatalog, ProviderSymbol};
pub use coordinator::{DataAccessCoordinator, QuerySource};
pub use error::{DataError, Result};
pub use storage::{MemoryStore, PgStore, PointStore, ProviderStore};
