pub(crate) mod click;
