// Copyright (c) Recovery Bench Developers.
fn main() -> anyhow::Result<()> {
    vergen::EmitBuilder::builder()
        .git_sha(true)
        .git_dirty(true)
        .cargo_target_triple()
        .emit()
}
