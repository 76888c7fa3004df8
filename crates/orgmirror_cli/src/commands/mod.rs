pub(crate) mod completions;
pub(crate) mod migrate;
pub(crate) mod operator;
pub(crate) mod status;

#[cfg(feature = "github")]
pub(crate) mod run;
