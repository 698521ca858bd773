mod filesystem;
mod properties;
mod scenarios;
