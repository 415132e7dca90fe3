mod closure_test;
