//! Contact directory resolution: company name in, recruiting addresses out.
//!
//! Strategies are tried in falling order of confidence and the first one that
//! yields an address wins:
//!
//! 1. enrichment API search by company name
//! 2. for each guessed domain: enrichment search by domain, then generic
//!    role addresses, then a scan of the company website
//! 3. model-proposed addresses at the best-guess domain
//!
//! An empty directory means every strategy came up dry.

pub mod domains;
pub mod enrichment;
pub mod prompts;
pub mod resolver;
pub mod website;

pub use enrichment::HunterClient;
pub use resolver::{ContactFinder, ContactResolver};
pub use website::HttpPageFetcher;
