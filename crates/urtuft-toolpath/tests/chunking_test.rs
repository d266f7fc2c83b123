use proptest::prelude::*;
use urtuft_core::ProgressStore;
use urtuft_toolpath::{
    compile, motion_count, plan_chunks, CompileOptions, JobContextStore, PixelGrid, RenderOptions,
};

fn compile_pixels(width: u32, height: u32, pixels: Vec<u8>) -> urtuft_toolpath::CompiledToolpath {
    let grid = PixelGrid::new(width, height, 1, pixels).unwrap();
    compile(&grid, &CompileOptions::default()).unwrap()
}

#[test]
fn test_empty_plan_registers_without_chunks() {
    let compiled = compile_pixels(3, 3, vec![200; 9]);
    let jobs = JobContextStore::in_memory();
    let progress = ProgressStore::in_memory();
    let registration = jobs.register(compiled, RenderOptions::default(), &progress);

    assert!(registration.chunks.is_empty());
    assert_eq!(progress.get(&registration.job_id).unwrap().total, 0);
    assert!(jobs
        .build_resume_program(&registration.job_id, 0)
        .unwrap()
        .is_none());
}

#[test]
fn test_single_column_is_one_chunk() {
    let compiled = compile_pixels(1, 10, vec![0; 10]);
    let jobs = JobContextStore::in_memory();
    let registration = jobs.register(compiled, RenderOptions::default(), &ProgressStore::in_memory());

    assert_eq!(registration.chunks.len(), 1);
    let chunk = &registration.chunks[0];
    assert_eq!(chunk.motion_count, 4);
    assert_eq!(chunk.block_count, 6);
    assert_eq!(chunk.progress_start, 0);
    assert!(chunk.program.starts_with("def tuft_program():\n"));
    assert!(chunk.program.ends_with("end\ntuft_program()\n"));
}

#[test]
fn test_ceiling_from_store() {
    // 6 columns fully dark => 6 segments of 4 motions.
    let compiled = compile_pixels(6, 2, vec![0; 12]);
    let jobs = JobContextStore::new(urtuft_core::InMemoryStore::new(), 9);
    let registration = jobs.register(compiled, RenderOptions::default(), &ProgressStore::in_memory());

    let counts: Vec<usize> = registration.chunks.iter().map(|c| c.motion_count).collect();
    assert_eq!(counts, vec![8, 8, 8]);
    let starts: Vec<usize> = registration.chunks.iter().map(|c| c.progress_start).collect();
    assert_eq!(starts, vec![0, 8, 16]);
}

fn pixel_grid() -> impl Strategy<Value = (u32, u32, Vec<u8>)> {
    (1u32..8, 1u32..8).prop_flat_map(|(width, height)| {
        let len = (width * height) as usize;
        (
            Just(width),
            Just(height),
            prop::collection::vec(prop_oneof![Just(0u8), Just(255u8)], len),
        )
    })
}

proptest! {
    #[test]
    fn prop_chunks_respect_segments((width, height, pixels) in pixel_grid(), ceiling in 1usize..20) {
        let compiled = compile_pixels(width, height, pixels);
        let ranges = plan_chunks(&compiled.blocks, &compiled.segment_blocks, ceiling);

        let total: usize = ranges.iter().map(|r| r.motion_count).sum();
        prop_assert_eq!(total, compiled.metadata.movement_count);
        prop_assert_eq!(total, motion_count(&compiled.blocks));

        // Contiguous cover of the block list.
        let mut expected_start = 0;
        for range in &ranges {
            prop_assert_eq!(range.start_index, expected_start);
            expected_start = range.end_index;
        }
        if !compiled.blocks.is_empty() {
            prop_assert_eq!(expected_start, compiled.blocks.len());
        }

        // No segment straddles a chunk boundary.
        for segment in &compiled.segment_blocks {
            let holders = ranges
                .iter()
                .filter(|r| r.start_index < segment.end && segment.start < r.end_index)
                .count();
            prop_assert_eq!(holders, 1);
        }

        // Only single-segment chunks may exceed the ceiling.
        for range in &ranges {
            if range.motion_count > ceiling {
                let inside = compiled
                    .segment_blocks
                    .iter()
                    .filter(|s| s.start >= range.start_index && s.end <= range.end_index)
                    .count();
                prop_assert_eq!(inside, 1);
            }
        }
    }
}
