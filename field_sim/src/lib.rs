pub mod api {
    pub mod rest;
}

pub mod config {
    pub mod settings;
}

pub mod gateway {
    pub mod simulator;
}

pub mod live {
    pub mod aggregator;
    pub mod history;
    pub mod mode;
    pub mod source;
}

pub mod tags {
    pub mod address;
    pub mod engine;
    pub mod structures;
    pub mod synth;
}

pub mod error;
pub mod logging;
