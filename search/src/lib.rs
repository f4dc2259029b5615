//! Binary search over flat CDXJ files and ZipNum index+shard pairs,
//! SURT match-type expansion, and the post-search filter language.

pub mod filterlang;
pub mod flatfile;
pub mod matchtype;
pub mod zipnumsearch;
