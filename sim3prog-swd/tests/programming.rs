// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! End to end programming sequences against the simulated target

use pretty_assertions::assert_eq;

use sim3prog_core::arm::scs::CoreRegister;
use sim3prog_core::sim3::FlashWriteData;
use sim3prog_swd::sim::SimTarget;
use sim3prog_swd::transaction::{Direction, Port, RegisterAccess};
use sim3prog_swd::{
    AdiStatus, CoreState, FlashEngine, ImageLoader, MemoryImage, Mismatch, PollLimit,
    ProgrammerConfig, Session, SwdError,
};

const TEST_WORDS: [u32; 4] = [0xA5A5_0000, 0x8888_5A5A, 0x1111_FFEE, 0x11FF_EEEE];

fn connected(target: SimTarget) -> Session<SimTarget> {
    let mut session = Session::new(target);
    session.open().unwrap();
    session.connect().unwrap();
    session.line_reset().unwrap();
    session.swd_if().power_up_debug_domain().unwrap();
    session
}

fn halted() -> Session<SimTarget> {
    let mut session = connected(SimTarget::new());
    session.identify().unwrap();
    session.halt_and_reset().unwrap();
    session
}

#[test]
fn write_and_read_back_flash() {
    let mut session = halted();
    let mut flash = FlashEngine::new(&mut session);
    flash.enable_clock().unwrap();

    let reversed: Vec<u32> = TEST_WORDS.iter().rev().copied().collect();
    flash.write_sequential_words(0x200, &TEST_WORDS).unwrap();
    flash.write_sequential_words(0x400, &reversed).unwrap();

    assert_eq!(flash.read_sequential_words(0x200, 4).unwrap(), TEST_WORDS);
    assert_eq!(flash.read_sequential_words(0x400, 4).unwrap(), reversed);
}

#[test]
fn page_erase_leaves_neighbours() {
    let mut session = halted();
    let mut flash = FlashEngine::new(&mut session);
    flash.write_sequential_words(0x200, &TEST_WORDS).unwrap();
    flash.write_sequential_words(0x400, &TEST_WORDS).unwrap();

    flash.erase_page(0x200).unwrap();
    assert_eq!(flash.read_sequential_words(0x200, 4).unwrap(), [0xFFFF_FFFF; 4]);
    assert_eq!(flash.read_sequential_words(0x400, 4).unwrap(), TEST_WORDS);
}

#[test]
fn each_word_is_two_half_word_writes() {
    let mut session = halted();
    let mut flash = FlashEngine::new(&mut session);
    flash.enable_clock().unwrap();
    session.swd_if().transport_mut().clear_transactions();

    FlashEngine::new(&mut session)
        .write_sequential_words(0x200, &TEST_WORDS)
        .unwrap();

    let log = session.swd_if().transport().transactions();
    let data: Vec<_> = log
        .iter()
        .filter(|transaction| {
            transaction
                .accesses()
                .iter()
                .all(|access| access.port() == Port::Ap && access.wire_address() == 0x0D)
        })
        .collect();
    assert_eq!(data.len(), TEST_WORDS.len());
    for (transaction, word) in data.iter().zip(TEST_WORDS) {
        let halves: Vec<_> = transaction
            .accesses()
            .iter()
            .map(|access| access.direction())
            .collect();
        assert_eq!(
            halves,
            vec![
                Direction::Write(word & 0xFFFF),
                Direction::Write(word >> 16)
            ]
        );
    }

    // DRW was pointed at WRITE_DATA, without auto-increment
    let setup = log
        .iter()
        .find(|transaction| {
            transaction.len() == 3
                && transaction.accesses()[2].direction()
                    == Direction::Write(FlashWriteData::ADDRESS)
        })
        .unwrap();
    assert_eq!(
        setup.accesses()[1].direction(),
        Direction::Write(0x2300_0002)
    );

    // Flash writes are never read back
    assert!(log.iter().all(|transaction| transaction.reads() == 0));
}

#[test]
fn bulk_erase_resets_core() {
    let mut target = SimTarget::new();
    target.load_flash(0x200, &TEST_WORDS);
    let mut session = connected(target);
    session.identify().unwrap();

    FlashEngine::new(&mut session).bulk_erase().unwrap();
    assert_eq!(session.core_state(), CoreState::Reset);
    assert!(!session.clock_enabled());
    assert_eq!(
        session.swd_if().transport().flash(0x200, 4),
        vec![0xFFFF_FFFF; 4]
    );

    // Flash access needs the core halted again
    assert_eq!(
        FlashEngine::new(&mut session).write_sequential_words(0x200, &TEST_WORDS),
        Err(SwdError::NotHalted)
    );
    session.halt_and_reset().unwrap();
    FlashEngine::new(&mut session)
        .write_sequential_words(0x200, &TEST_WORDS)
        .unwrap();
}

#[test]
fn wrong_chip_aborts_before_erase() {
    let mut target = SimTarget::new();
    target.set_chip_ap_id(0x1234_5678);
    target.load_flash(0x200, &TEST_WORDS);
    let mut session = connected(target);

    assert_eq!(
        session.identify(),
        Err(SwdError::ChipApMismatch { found: 0x1234_5678 })
    );
    session.swd_if().transport_mut().clear_transactions();
    assert_eq!(
        FlashEngine::new(&mut session).bulk_erase(),
        Err(SwdError::NotIdentified)
    );

    let target = session.swd_if().transport();
    assert!(target.transactions().is_empty());
    assert_eq!(target.flash(0x200, 4), TEST_WORDS.to_vec());
}

#[test]
fn flash_rejected_while_running() {
    let mut session = halted();
    session.release_core().unwrap();
    session.swd_if().transport_mut().clear_transactions();

    let mut flash = FlashEngine::new(&mut session);
    assert_eq!(
        flash.write_sequential_words(0x200, &TEST_WORDS),
        Err(SwdError::NotHalted)
    );
    assert_eq!(flash.erase_page(0x200), Err(SwdError::NotHalted));
    assert!(session.swd_if().transport().transactions().is_empty());
}

#[test]
fn bounded_erase_poll_times_out() {
    let mut target = SimTarget::new();
    target.set_erase_busy_reads(100);
    let mut session = connected(target);
    session.identify().unwrap();
    session.halt_and_reset().unwrap();
    session.set_poll_limit(PollLimit::Attempts(5));

    let result = FlashEngine::new(&mut session).erase_page(0x400);
    assert_eq!(result, Err(SwdError::Timeout { polls: 5 }));
    assert!(result.unwrap_err().requires_retry());

    assert_eq!(
        FlashEngine::new(&mut session).bulk_erase(),
        Err(SwdError::Timeout { polls: 5 })
    );
}

#[test]
fn transport_failure_mid_write() {
    let mut session = halted();
    FlashEngine::new(&mut session).enable_clock().unwrap();
    session
        .swd_if()
        .transport_mut()
        .fail_next_execute(AdiStatus::HwifTransferError);

    let error = FlashEngine::new(&mut session)
        .write_sequential_words(0x200, &TEST_WORDS)
        .unwrap_err();
    assert_eq!(error, SwdError::Transport(AdiStatus::HwifTransferError));
    assert!(error.requires_reset());
    assert!(session.swd_if().pending().is_empty());

    // Nothing from the failed call is replayed
    session.swd_if().transport_mut().clear_transactions();
    session.swd_if().read_ahb(0x2000_0000).unwrap();
    assert_eq!(session.swd_if().transport().transactions()[0].len(), 4);
}

#[test]
fn sram_load_in_chunks() {
    let mut session = halted();
    let mut words = vec![0x2000_8000, 0x2000_0401];
    words.extend((0..2048).map(|ii| ii * 3));
    assert_eq!(words.len(), 2050);

    let image = MemoryImage::new(0x2000_0000, words.clone()).unwrap();
    let report = ImageLoader::new(&mut session).load(&image).unwrap();

    assert_eq!(report.chunks, 3);
    assert_eq!(report.words_written, 2050);
    assert_eq!(report.mismatch_count, 0);
    assert_eq!(report.reset_handler, 0x2000_0400);
    assert_eq!(report.pc_readback, 0x2000_0400);
    assert!(report.verified());
    assert_eq!(session.core_state(), CoreState::Running);

    let target = session.swd_if().transport();
    assert_eq!(target.sram(0x2000_0000, 2050), words);
    assert_eq!(target.vtor(), 0x2000_0000);
    assert_eq!(target.core_register(CoreRegister::Sp), 0x2000_8000);
    assert!(!target.core_halted());
}

fn two_word_chunks() -> ProgrammerConfig {
    ProgrammerConfig {
        chunk_words: 2,
        ..Default::default()
    }
}

#[test]
fn each_chunk_read_back_before_next() {
    let mut session = halted();
    session.swd_if().transport_mut().clear_transactions();
    let image = MemoryImage::new(0x2000_0000, vec![0x2000_8000, 0x2000_0101, 1, 2, 3, 4]).unwrap();
    let report = ImageLoader::new(&mut session)
        .with_config(&two_word_chunks())
        .load(&image)
        .unwrap();
    assert_eq!(report.chunks, 3);

    // Per chunk: set-up and first write, second write, set-up and first
    // read, second read
    let log = session.swd_if().transport().transactions();
    for (chunk, words) in image.words().chunks(2).enumerate() {
        let address = 0x2000_0000 + chunk as u32 * 8;
        let sent = &log[chunk * 4..chunk * 4 + 4];

        assert_eq!(sent[0].accesses()[2], RegisterAccess::write(0x05, address));
        assert_eq!(sent[0].accesses()[3], RegisterAccess::write(0x0D, words[0]));
        assert_eq!(sent[1].accesses(), &[RegisterAccess::write(0x0D, words[1])]);
        assert_eq!(sent[2].accesses()[2], RegisterAccess::write(0x05, address));
        assert_eq!(sent[2].accesses()[3], RegisterAccess::read(0x0D));
        assert_eq!(sent[3].accesses(), &[RegisterAccess::read(0x0D)]);
    }
}

#[test]
fn mismatches_accumulate_across_chunks() {
    let mut target = SimTarget::new();
    target.set_stuck_sram(0x2000_0008, 0xDEAD_BEEF);
    target.set_stuck_sram(0x2000_0014, 0xDEAD_BEEF);
    let mut session = connected(target);
    session.identify().unwrap();
    session.halt_and_reset().unwrap();

    let image = MemoryImage::new(0x2000_0000, vec![0x2000_8000, 0x2000_0101, 1, 2, 3, 4]).unwrap();
    let report = ImageLoader::new(&mut session)
        .with_config(&two_word_chunks())
        .load(&image)
        .unwrap();

    assert_eq!(report.chunks, 3);
    assert_eq!(report.words_written, 6);
    assert_eq!(report.mismatch_count, 2);
    assert_eq!(
        report.mismatches,
        vec![
            Mismatch {
                index: 2,
                expected: 1,
                read: 0xDEAD_BEEF
            },
            Mismatch {
                index: 5,
                expected: 4,
                read: 0xDEAD_BEEF
            },
        ]
    );
    assert!(!report.verified());
    // The load still completes
    assert_eq!(session.core_state(), CoreState::Running);
}

#[test]
fn core_register_round_trip() {
    let mut session = halted();
    let swd = session.swd_if();
    swd.write_core_register(CoreRegister::Pc, 0x2000_0100).unwrap();
    assert_eq!(swd.read_core_register(CoreRegister::Pc).unwrap(), 0x2000_0100);
    swd.write_core_register(CoreRegister::R4, 0xDEAD_BEEF).unwrap();
    assert_eq!(swd.read_core_register(CoreRegister::R4).unwrap(), 0xDEAD_BEEF);
}

#[test]
fn full_programming_run() {
    let config = ProgrammerConfig::from_json(r#"{"chunk_words": 512}"#).unwrap();
    config.validate().unwrap();

    let mut session = connected(SimTarget::new());
    session.set_poll_limit(config.poll_limit);
    session.identify().unwrap();
    FlashEngine::new(&mut session).bulk_erase().unwrap();
    session.halt_and_reset().unwrap();

    let mut flash = FlashEngine::new(&mut session).with_config(&config);
    flash.enable_clock().unwrap();
    flash.write_sequential_words(0x200, &TEST_WORDS).unwrap();
    assert_eq!(flash.read_sequential_words(0x200, 4).unwrap(), TEST_WORDS);
    flash.erase_page(0x200).unwrap();
    assert_eq!(flash.read_sequential_words(0x200, 4).unwrap(), [0xFFFF_FFFF; 4]);

    let image = MemoryImage::new(config.sram_base, vec![0x2000_8000, 0x2000_0009, 0, 0]).unwrap();
    let report = ImageLoader::new(&mut session)
        .with_config(&config)
        .load(&image)
        .unwrap();
    assert!(report.verified());

    session.swd_if().power_down_debug_domain().unwrap();
    session.close().unwrap();
    let counters = session.error_counters();
    assert_eq!(counters.errors_found, 0);
    assert!(!session.into_transport().is_open());
}
