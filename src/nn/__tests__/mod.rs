mod backbone_test;
mod gate_test;
