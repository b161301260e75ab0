use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    // Buttons in the order the shift register reports them
    #[derive(Default, Serialize, Deserialize)]
    pub struct JoypadButtons : u8 {
        const A =       0b0000_0001;
        const B =       0b0000_0010;
        const SELECT =  0b0000_0100;
        const START =   0b0000_1000;
        const UP =      0b0001_0000;
        const DOWN =    0b0010_0000;
        const LEFT =    0b0100_0000;
        const RIGHT =   0b1000_0000;
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Joypad {
    pub strobe: bool,
    pub button_idx: u8,
    /// Buttons currently held by the player.
    pub status: JoypadButtons,
    /// Snapshot of `status` taken by the last strobe.
    latch: JoypadButtons,
}

impl Joypad {
    pub fn write(&mut self, data: u8) {
        self.strobe = data & 1 == 1;
        if self.strobe {
            self.reload();
        }
    }

    pub fn read(&mut self) -> u8 {
        // While strobe is held the register keeps reloading, so only A is visible
        if self.strobe {
            self.reload();
        }
        if self.button_idx > 7 {
            return 1;
        }
        let response = (self.latch.bits() >> self.button_idx) & 1;
        if !self.strobe {
            self.button_idx += 1;
        }
        response
    }

    fn reload(&mut self) {
        self.latch = self.status;
        self.button_idx = 0;
    }

    pub fn set_key(&mut self, button: JoypadButtons, pressed: bool) {
        self.status.set(button, pressed);
    }

    pub fn press(&mut self, button: JoypadButtons) {
        self.status.insert(button);
    }

    pub fn release(&mut self, button: JoypadButtons) {
        self.status.remove(button);
    }
}
