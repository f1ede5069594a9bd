mod fixtures;

mod control;
