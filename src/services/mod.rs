pub(crate) mod ledger;
pub(crate) mod signature;
pub(crate) mod subscription;
