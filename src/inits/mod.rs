pub mod pinned;
pub mod randomsample;
