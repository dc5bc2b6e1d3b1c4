use crate::{
    OneWireAsync, OneWireSearch, OneWireSearchKind, OneWireStatus, RomCode, error::OneWireError,
};

impl OneWireSearch {
    /// Runs one search pass on an asynchronous bus.
    /// See [search](OneWireSearch::search) for the outcomes.
    pub async fn search_async<T: OneWireAsync>(
        &mut self,
        onewire: &mut T,
        kind: OneWireSearchKind,
    ) -> Result<Option<RomCode>, OneWireError<T::BusError>> {
        if self.last_device() {
            self.reset();
            return Ok(None);
        }
        if !onewire.reset().await?.presence() {
            self.reset();
            return Ok(None);
        }
        onewire.write_byte(kind as u8).await?;
        self.begin_pass();
        let mut last_zero = 0;
        for id_bit_number in 1..=64 {
            let triplet = onewire
                .read_triplet(self.preferred_direction(id_bit_number))
                .await?;
            if !self.record(id_bit_number, triplet, &mut last_zero) {
                self.reset();
                return Err(OneWireError::SearchAborted);
            }
        }
        self.finish_pass(last_zero)
    }

    /// Finds the first device on an asynchronous bus.
    pub async fn first_async<T: OneWireAsync>(
        &mut self,
        onewire: &mut T,
    ) -> Result<Option<RomCode>, OneWireError<T::BusError>> {
        self.reset();
        self.search_async(onewire, OneWireSearchKind::Normal).await
    }

    /// Finds the next device on an asynchronous bus.
    pub async fn next_async<T: OneWireAsync>(
        &mut self,
        onewire: &mut T,
    ) -> Result<Option<RomCode>, OneWireError<T::BusError>> {
        self.search_async(onewire, OneWireSearchKind::Normal).await
    }

    /// Verifies if the device with the given ROM code is present on an asynchronous bus.
    ///
    /// The search state is left as it was before the call.
    pub async fn verify_async<T: OneWireAsync>(
        &mut self,
        onewire: &mut T,
        rom: &RomCode,
    ) -> Result<bool, OneWireError<T::BusError>> {
        let saved = *self;
        self.verify_setup(rom);
        let res = self.search_async(onewire, OneWireSearchKind::Normal).await;
        *self = saved;
        match res {
            Ok(found) => Ok(found.as_ref() == Some(rom)),
            Err(OneWireError::SearchAborted | OneWireError::InvalidRomCrc | OneWireError::ShortCircuit) => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
