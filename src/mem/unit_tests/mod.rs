#[cfg(test)]
mod support;
#[cfg(test)]
mod writeback_tests;
