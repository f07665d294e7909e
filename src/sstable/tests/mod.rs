mod tests_basic;
mod tests_corruption;
mod tests_file_modes;
mod tests_merkle;
