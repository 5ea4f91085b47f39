mod test_boolean_basic;
mod test_clip_basic;
mod test_primitives_basic;
mod test_repair_basic;
mod test_sweep_basic;
