pub mod cache;
pub mod client;
pub mod filter;
pub mod gating;
pub mod key;
pub mod pager;

pub use cache::{QueryCache, QueryState, QueryStatus};
pub use client::{Poller, QueryClient};
pub use filter::{BoundingBox, FilterSet};
pub use key::{QueryKey, QueryKind};
pub use pager::{EventPager, PageSource, Pager, PagerStatus};
