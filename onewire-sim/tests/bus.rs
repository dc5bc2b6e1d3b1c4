use embedded_hal_mock::eh1::delay::NoopDelay;
use embedded_onewire::{OneWireCrc, OneWireStatus, SearchState};
use onewire_sim::{SimBus, SimDevice, SimPio};
use pio_onewire::{
    OneWire, OneWireEngine, OneWireError, OneWireSearchKind, PioError, PioOneWireBuilder, Pull,
    RomCode, SlotArena, clock_divider,
};

/// Order in which the search returns ROM codes: least significant bit first.
fn search_order(rom: &RomCode) -> u64 {
    u64::from_le_bytes(*rom).reverse_bits()
}

fn sorted(devices: &[SimDevice]) -> Vec<RomCode> {
    let mut roms: Vec<_> = devices.iter().map(SimDevice::rom).collect();
    roms.sort_by_key(search_order);
    roms
}

fn sim(devices: impl IntoIterator<Item = SimDevice>) -> SimPio {
    SimPio::new(SimBus::new(devices))
}

fn mixed_bus() -> Vec<SimDevice> {
    let mut devices = Vec::new();
    for family in [0x28, 0x10, 0x3b, 0x28, 0x28, 0x10, 0x2d, 0x28, 0x3b, 0x28, 0x01, 0x28] {
        devices.push(SimDevice::random(family));
    }
    devices
}

#[test]
fn enumerates_every_device_in_order() {
    let devices = mixed_bus();
    let expected = sorted(&devices);
    let mut pio = sim(devices);
    let mut onewire = PioOneWireBuilder::new(2).build(&mut pio, NoopDelay::new()).unwrap();

    let mut found = Vec::new();
    let mut next = onewire.first().unwrap();
    while let Some(rom) = next {
        assert!(OneWireCrc::validate(&rom));
        found.push(rom);
        next = onewire.next().unwrap();
    }
    assert_eq!(found, expected);
    assert_eq!(onewire.search_state().state(), SearchState::Idle);
    // the enumeration starts over after running out
    assert_eq!(onewire.next().unwrap(), Some(expected[0]));

    let (pio, _) = onewire.release();
    assert_eq!(pio.bus().resets(), expected.len() + 1);
}

#[test]
fn empty_bus() {
    let mut pio = sim([]);
    let mut onewire = PioOneWireBuilder::new(2).build(&mut pio, NoopDelay::new()).unwrap();
    assert!(!onewire.reset().unwrap().presence());
    assert_eq!(onewire.first(), Ok(None));
    assert_eq!(onewire.read_rom(), Ok(None));
    assert_eq!(onewire.select(&[0x28, 1, 2, 3, 4, 5, 6, 7]), Ok(false));
    let (pio, _) = onewire.release();
    assert!(pio.bus().last_frame().is_empty());
    assert_eq!(pio.bus().resets(), 4);
}

#[test]
fn select_sends_match_rom() {
    let devices = mixed_bus();
    let roms = sorted(&devices);
    let mut pio = sim(devices);
    let mut onewire = PioOneWireBuilder::new(2).build(&mut pio, NoopDelay::new()).unwrap();
    assert_eq!(onewire.select(&roms[3]), Ok(true));
    onewire.write_byte(0x44).unwrap();
    let (pio, _) = onewire.release();

    let mut frame = vec![0x55];
    frame.extend_from_slice(&roms[3]);
    frame.push(0x44);
    assert_eq!(pio.bus().last_frame(), frame);
    for dev in pio.bus().devices() {
        if dev.rom() == roms[3] {
            assert!(dev.selected());
            assert_eq!(dev.received(), [0x44]);
        } else {
            assert!(!dev.selected());
            assert!(dev.received().is_empty());
        }
    }
}

#[test]
fn skip_rom_addresses_every_device() {
    let mut pio = sim(mixed_bus());
    let mut onewire = PioOneWireBuilder::new(2).build(&mut pio, NoopDelay::new()).unwrap();
    assert_eq!(onewire.address(None), Ok(true));
    onewire.write_byte(0x44).unwrap();
    let (pio, _) = onewire.release();
    assert_eq!(pio.bus().last_frame(), [0xcc, 0x44]);
    assert!(pio.bus().devices().iter().all(|d| d.received() == [0x44]));
}

#[test]
fn read_rom() {
    let single = SimDevice::with_serial(0x28, [1, 2, 3, 4, 5, 6]);
    let rom = single.rom();
    let mut pio = sim([single]);
    let mut onewire = PioOneWireBuilder::new(2).build(&mut pio, NoopDelay::new()).unwrap();
    assert_eq!(onewire.read_rom(), Ok(Some(rom)));
    drop(onewire);

    let mut pio = sim([
        SimDevice::with_serial(0x28, [1, 2, 3, 4, 5, 6]),
        SimDevice::with_serial(0x28, [6, 5, 4, 3, 2, 1]),
    ]);
    let mut onewire = PioOneWireBuilder::new(2).build(&mut pio, NoopDelay::new()).unwrap();
    assert_eq!(onewire.read_rom(), Err(OneWireError::InvalidRomCrc));
}

#[test]
fn search_rejects_bad_crc() {
    let mut rom = SimDevice::with_serial(0x28, [1, 2, 3, 4, 5, 6]).rom();
    rom[7] ^= 1;
    let mut pio = sim([SimDevice::new(rom)]);
    let mut onewire = PioOneWireBuilder::new(2).build(&mut pio, NoopDelay::new()).unwrap();
    assert_eq!(onewire.first(), Err(OneWireError::InvalidRomCrc));
    assert_eq!(onewire.search_state().state(), SearchState::Idle);
    assert_eq!(onewire.search_state().last_discrepancy(), 0);
    // a bad code is not the same as an empty bus
    assert!(onewire.reset().unwrap().presence());
}

#[test]
fn bulk_transfers_follow_threshold() {
    let scratchpad = [0x50, 0x05, 0x4b, 0x46, 0x7f, 0xff, 0x0c, 0x10, 0x1c];
    for threshold in [0, 8, 16, 24, 32] {
        let dev = SimDevice::random(0x28).with_response(0xbe, &scratchpad);
        let rom = dev.rom();
        let mut pio = sim([dev]);
        let mut onewire = PioOneWireBuilder::new(2)
            .with_fifo_threshold(threshold)
            .build(&mut pio, NoopDelay::new())
            .unwrap();
        assert_eq!(onewire.fifo_threshold(), if threshold == 0 { 32 } else { threshold });

        assert_eq!(onewire.select(&rom), Ok(true));
        onewire.write_bytes(&[0x4e, 0x4b, 0x46, 0x7f]).unwrap();
        assert_eq!(onewire.select(&rom), Ok(true));
        onewire.write_bytes(&[0xbe]).unwrap();
        let mut buf = [0; 9];
        onewire.read_bytes(&mut buf).unwrap();
        assert_eq!(buf, scratchpad, "threshold {threshold}");

        let (pio, _) = onewire.release();
        assert_eq!(pio.bus().devices()[0].received(), [0x4e, 0x4b, 0x46, 0x7f, 0xbe]);
        assert!(!pio.tx_overflow(0));
    }
}

#[test]
fn fifo_threshold_must_be_whole_bytes() {
    let mut pio = sim([SimDevice::random(0x28)]);
    assert_eq!(
        PioOneWireBuilder::new(2)
            .with_fifo_threshold(7)
            .build(&mut pio, NoopDelay::new())
            .err(),
        Some(PioError::InvalidThreshold(7))
    );
    let mut onewire = PioOneWireBuilder::new(2).build(&mut pio, NoopDelay::new()).unwrap();
    assert_eq!(onewire.set_fifo_threshold(12), Err(PioError::InvalidThreshold(12)));
    assert_eq!(onewire.fifo_threshold(), 8);
    assert_eq!(onewire.set_fifo_threshold(24), Ok(()));
    assert_eq!(onewire.fifo_threshold(), 24);
}

#[test]
fn bit_transfers() {
    let dev = SimDevice::random(0x28).with_response(0xb4, &[0xfe]);
    let mut pio = sim([dev]);
    let mut onewire = PioOneWireBuilder::new(2).build(&mut pio, NoopDelay::new()).unwrap();
    assert_eq!(onewire.address(None), Ok(true));
    for i in 0..8 {
        onewire.write_bit(0xb4 & (1 << i) != 0).unwrap();
    }
    assert_eq!(onewire.read_bit(), Ok(false));
    assert_eq!(onewire.read_bit(), Ok(true));
    let (pio, _) = onewire.release();
    assert_eq!(pio.bus().devices()[0].received(), [0xb4]);
}

#[test]
fn strong_pullup() {
    let mut pio = sim([SimDevice::random(0x28)]);
    let mut onewire = PioOneWireBuilder::new(2).build(&mut pio, NoopDelay::new()).unwrap();
    assert_eq!(onewire.address(None), Ok(true));
    onewire.write_byte_power(0x44).unwrap();
    assert!(onewire.power_active());
    onewire.end_power().unwrap();
    assert!(!onewire.power_active());
    assert!(onewire.reset().unwrap().presence());

    // a transfer while powered releases the line first
    onewire.write_byte_power(0x44).unwrap();
    let status = onewire.reset().unwrap();
    assert!(status.presence());
    assert_eq!(status.power(), Some(false));

    let (pio, _) = onewire.release();
    assert_eq!(pio.bus().power_cycles(), 2);
    assert_eq!(pio.bus().powered_slots(), 0);
    assert!(!pio.bus().powered());
}

#[test]
fn strong_pullup_through_buffer() {
    let mut pio = sim([SimDevice::random(0x28)]);
    let mut onewire = PioOneWireBuilder::new(2)
        .with_direction_pin(3)
        .build(&mut pio, NoopDelay::new())
        .unwrap();
    assert_eq!(onewire.address(None), Ok(true));
    onewire.write_byte_power(0x44).unwrap();
    onewire.end_power().unwrap();
    let (pio, _) = onewire.release();
    assert_eq!(pio.bus().power_cycles(), 1);
    assert!(!pio.bus().powered());
    assert_eq!(pio.bus().devices()[0].received(), [0x44]);
}

#[test]
fn alarm_search() {
    let mut devices = mixed_bus();
    for dev in devices.iter_mut().step_by(4) {
        *dev = dev.clone().with_alarm(true);
    }
    let expected: Vec<_> = sorted(&devices)
        .into_iter()
        .filter(|rom| devices.iter().any(|d| d.rom() == *rom && d.alarm()))
        .collect();
    assert_eq!(expected.len(), 3);
    let mut pio = sim(devices);
    let mut onewire = PioOneWireBuilder::new(2).build(&mut pio, NoopDelay::new()).unwrap();
    onewire.search_reset();
    let mut found = Vec::new();
    while let Some(rom) = onewire.search(OneWireSearchKind::Alarmed).unwrap() {
        found.push(rom);
    }
    assert_eq!(found, expected);
}

#[test]
fn family_target_and_skip() {
    let devices: Vec<_> = [0x10, 0x28, 0x10, 0x28, 0x28, 0x3b]
        .into_iter()
        .map(SimDevice::random)
        .collect();
    let roms = sorted(&devices);
    let mut pio = sim(devices);
    let mut onewire = PioOneWireBuilder::new(2).build(&mut pio, NoopDelay::new()).unwrap();

    onewire.target_setup(0x28);
    let first = onewire.next().unwrap().unwrap();
    assert_eq!(first, roms[2]);
    assert_eq!(first[0], 0x28);

    onewire.family_skip_setup();
    assert_eq!(onewire.next().unwrap(), Some(roms[5]));
    assert_eq!(onewire.next().unwrap(), None);
}

#[test]
fn verify_keeps_enumeration() {
    let devices = mixed_bus();
    let roms = sorted(&devices);
    let mut pio = sim(devices);
    let mut onewire = PioOneWireBuilder::new(2).build(&mut pio, NoopDelay::new()).unwrap();

    assert_eq!(onewire.first().unwrap(), Some(roms[0]));
    let state = *onewire.search_state();
    assert_eq!(onewire.verify(&roms[7]), Ok(true));
    let mut absent = roms[7];
    absent[6] ^= 0x01;
    absent[7] = OneWireCrc::compute(&absent[..7]);
    assert_eq!(onewire.verify(&absent), Ok(false));
    assert_eq!(*onewire.search_state(), state);
    assert_eq!(onewire.next().unwrap(), Some(roms[1]));
}

#[test]
fn shorted_line() {
    let mut pio = sim([SimDevice::random(0x28).stuck_low()]);
    let mut onewire = PioOneWireBuilder::new(2).build(&mut pio, NoopDelay::new()).unwrap();
    assert!(onewire.reset().unwrap().presence());
    assert_eq!(onewire.first(), Err(OneWireError::ShortCircuit));
    assert_eq!(onewire.search_state().state(), SearchState::Idle);
}

#[test]
fn silent_devices_abort_the_search() {
    let mut pio = sim([SimDevice::random(0x28).silent()]);
    let mut onewire = PioOneWireBuilder::new(2).build(&mut pio, NoopDelay::new()).unwrap();
    assert_eq!(onewire.first(), Err(OneWireError::SearchAborted));
    assert_eq!(onewire.search_state().last_discrepancy(), 0);
}

#[test]
fn engine_lifecycle() {
    let mut pio = sim([SimDevice::random(0x28)]).with_clock_hz(133_000_000);
    let onewire = PioOneWireBuilder::new(4)
        .with_direction_pin(5)
        .build(&mut pio, NoopDelay::new())
        .unwrap();
    let pins = onewire.pins();
    assert_eq!((pins.data, pins.dir), (4, Some(5)));
    let (pio, _) = onewire.release();

    assert_eq!(pio.pull(4), Some(Pull::None));
    assert!(pio.is_attached(4) && pio.is_attached(5));
    assert!(pio.program_loaded(0));
    let cfg = pio.config(0).unwrap();
    assert_eq!(cfg.clock_divider, clock_divider(133_000_000).unwrap());
    assert_eq!(cfg.clock_divider.to_num::<u32>(), 133);
    assert_eq!((cfg.side_set_base, cfg.side_set_pindirs), (5, false));
    assert_eq!((cfg.set_base, cfg.in_base), (4, 4));
    assert!(!pio.is_enabled(0));
    assert!(!pio.is_output(4));
    assert_eq!(pio.arena().claimed(), 0);
    assert_eq!(pio.arena().used_words(), 0);
}

#[test]
fn program_loads_after_other_programs() {
    let mut arena = SlotArena::new();
    let _other = arena.allocate(6).unwrap();
    let _sm = arena.claim().unwrap();
    let dev = SimDevice::random(0x28);
    let rom = dev.rom();
    let mut pio = sim([dev]).with_arena(arena);
    let mut onewire = PioOneWireBuilder::new(2).build(&mut pio, NoopDelay::new()).unwrap();
    assert_eq!(onewire.first(), Ok(Some(rom)));
    let (pio, _) = onewire.release();
    assert!(pio.program_loaded(6));
    assert_eq!(pio.config(1).unwrap().wrap_target, 6 + 11);
    assert_eq!(pio.arena().used_words(), 6);
    assert_eq!(pio.arena().claimed(), 1);
}

#[test]
fn out_of_resources() {
    let mut arena = SlotArena::new();
    let _sms: Vec<_> = (0..4).map(|_| arena.claim().unwrap()).collect();
    let mut pio = sim([]).with_arena(arena);
    let res = PioOneWireBuilder::new(2).build(&mut pio, NoopDelay::new());
    assert_eq!(res.err(), Some(PioError::NoFreeStateMachine));
    assert_eq!(pio.pull(2), None);

    let mut arena = SlotArena::new();
    let _program = arena.allocate(16).unwrap();
    let mut pio = sim([]).with_arena(arena);
    let res = PioOneWireBuilder::new(2).build(&mut pio, NoopDelay::new());
    assert_eq!(res.err(), Some(PioError::NoProgramSpace));
    // the state machine claimed before loading is handed back
    assert_eq!(pio.arena().claimed(), 0);
    assert_eq!(pio.pull(2), None);
}

#[test]
fn rejects_bad_pins_and_clocks() {
    let mut pio = sim([]).with_arena(SlotArena::new().with_gpio_base(16));
    let res = PioOneWireBuilder::new(3).build(&mut pio, NoopDelay::new());
    assert_eq!(res.err(), Some(PioError::PinOutOfRange(3)));
    let res = PioOneWireBuilder::new(20)
        .with_direction_pin(50)
        .build(&mut pio, NoopDelay::new());
    assert_eq!(res.err(), Some(PioError::PinOutOfRange(50)));

    let mut pio = sim([]).with_clock_hz(500_000);
    let res = PioOneWireBuilder::new(2).build(&mut pio, NoopDelay::new());
    assert_eq!(res.err(), Some(PioError::InvalidClockDivider));
    assert_eq!(pio.arena().claimed(), 0);
    assert_eq!(pio.pull(2), None);
}
