use crate::{
    OneWirePins, PioBlock, PioError, PioOneWireAsync, PioStatus,
    engine::{check_threshold, sampled},
};
use core::convert::Infallible;
use embedded_hal_async::delay::DelayNs;
use embedded_onewire::{
    OneWireAsync, OneWireEngineAsync, OneWireResult, OneWireSearch, OneWireSearchKind, RomCode,
};

impl<P: PioBlock, D: DelayNs> PioOneWireAsync<P, D> {
    /// Waits until the state machine is parked at the start of the bit loop.
    pub async fn wait_idle(&mut self) {
        while !self.engine.is_idle() {
            self.delay.delay_ns(self.poll_ns).await;
        }
    }

    /// Sets the batch width of bulk transfers, in bits.
    /// See [`PioOneWire::set_fifo_threshold`](crate::PioOneWire::set_fifo_threshold).
    pub fn set_fifo_threshold(&mut self, bits: u8) -> Result<(), PioError> {
        self.engine.batch = check_threshold(bits)?;
        log::debug!("1-Wire bulk transfers batched by {} bits", self.engine.batch);
        Ok(())
    }

    /// Batch width of bulk transfers, in bits.
    pub fn fifo_threshold(&self) -> u8 {
        self.engine.batch
    }

    /// GPIOs driven by this bus master.
    pub fn pins(&self) -> OneWirePins {
        self.engine.pins()
    }

    /// Whether the strong pull-up is engaged.
    pub fn power_active(&self) -> bool {
        self.engine.power
    }

    /// Stops the state machine, unloads the program and returns the owned resources.
    pub fn release(mut self) -> (P, D) {
        if self.engine.power {
            self.engine.power_off();
        }
        (self.engine.release(), self.delay)
    }

    /// Search state of the bus.
    pub fn search_state(&self) -> &OneWireSearch {
        &self.search
    }

    /// Restricts the next search to devices of one family.
    pub fn target_setup(&mut self, family: u8) {
        self.search.target_setup(family);
    }

    /// Skips the remaining devices of the family found last.
    pub fn family_skip_setup(&mut self) {
        self.search.family_skip_setup();
    }

    /// Checks if the device with the given ROM code is on the bus, without
    /// disturbing an enumeration in progress.
    pub async fn verify(&mut self, rom: &RomCode) -> OneWireResult<bool, Infallible> {
        let mut search = core::mem::take(&mut self.search);
        let res = search.verify_async(self, rom).await;
        self.search = search;
        res
    }

    fn ensure_unpowered(&mut self) {
        if self.engine.power {
            log::warn!("1-Wire transfer while the strong pull-up is engaged, releasing it");
            self.engine.power_off();
        }
    }

    async fn wait_rx(&mut self) -> u32 {
        loop {
            if let Some(word) = self.engine.try_get() {
                return word;
            }
            self.delay.delay_ns(self.poll_ns).await;
        }
    }

    async fn transact(&mut self, word: u32, bits: u8) -> u32 {
        self.ensure_unpowered();
        if self.engine.threshold() != bits {
            self.wait_idle().await;
            self.engine.retune(bits);
        }
        while !self.engine.try_put(word) {
            self.delay.delay_ns(self.poll_ns).await;
        }
        sampled(self.wait_rx().await, bits)
    }
}

impl<P: PioBlock, D: DelayNs> OneWireAsync for PioOneWireAsync<P, D> {
    type Status = PioStatus;

    type BusError = Infallible;

    async fn reset(&mut self) -> OneWireResult<Self::Status, Self::BusError> {
        self.ensure_unpowered();
        self.wait_idle().await;
        self.engine.start_reset();
        let line = self.wait_rx().await;
        let status = PioStatus::new()
            .with_presence_detect(line & 1 == 0)
            .with_power_active(self.engine.power);
        log::trace!("1-Wire reset, presence: {}", status.presence_detect());
        Ok(status)
    }

    async fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Self::BusError> {
        self.transact(byte as u32, 8).await;
        Ok(())
    }

    async fn read_byte(&mut self) -> OneWireResult<u8, Self::BusError> {
        Ok(self.transact(0xff, 8).await as u8)
    }

    async fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Self::BusError> {
        self.transact(bit as u32, 1).await;
        Ok(())
    }

    async fn read_bit(&mut self) -> OneWireResult<bool, Self::BusError> {
        Ok(self.transact(1, 1).await != 0)
    }

    async fn write_bytes(&mut self, bytes: &[u8]) -> OneWireResult<(), Self::BusError> {
        let batch = self.engine.batch as usize / 8;
        for chunk in bytes.chunks(batch) {
            let word = chunk
                .iter()
                .rev()
                .fold(0u32, |word, &b| (word << 8) | b as u32);
            self.transact(word, chunk.len() as u8 * 8).await;
        }
        Ok(())
    }

    async fn read_bytes(&mut self, buf: &mut [u8]) -> OneWireResult<(), Self::BusError> {
        let batch = self.engine.batch as usize / 8;
        for chunk in buf.chunks_mut(batch) {
            let word = self.transact(u32::MAX, chunk.len() as u8 * 8).await;
            for (i, b) in chunk.iter_mut().enumerate() {
                *b = (word >> (8 * i)) as u8;
            }
        }
        Ok(())
    }

    async fn write_byte_power(&mut self, byte: u8) -> OneWireResult<(), Self::BusError> {
        self.write_byte(byte).await?;
        self.wait_idle().await;
        self.engine.power_on();
        Ok(())
    }

    async fn end_power(&mut self) -> OneWireResult<(), Self::BusError> {
        if self.engine.power {
            self.engine.power_off();
        }
        Ok(())
    }
}

impl<P: PioBlock, D: DelayNs> OneWireEngineAsync for PioOneWireAsync<P, D> {
    fn search_reset(&mut self) {
        self.search.reset();
    }

    async fn search(
        &mut self,
        kind: OneWireSearchKind,
    ) -> OneWireResult<Option<RomCode>, Self::BusError> {
        let mut search = core::mem::take(&mut self.search);
        let res = search.search_async(self, kind).await;
        self.search = search;
        res
    }
}
