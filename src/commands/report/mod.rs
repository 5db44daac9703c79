mod assemble;
mod codec;
mod discovery;
mod document;
mod ground_truth;
mod normalize;
mod run;
#[cfg(test)]
mod tests;

pub use run::run;

pub(crate) use discovery::{BENCH_STAT_PATTERN, RESULTS_PATTERN, latest_matching};
pub(crate) use normalize::load_results;
pub(crate) use run::count_jsonl_records;
