use simple_error::SimpleResult;

use crate::cpu::{CpuModel, Fault, Step, CPU, R16, SR};
use crate::hardware::Hardware;
use crate::tools;

#[cfg(test)]
#[path = "./machine_test.rs"]
mod machine_test;

/// top of the real-mode address window where firmware images end
const FIRMWARE_TOP: u32 = 1 << 20;

pub struct Machine {
    pub hw: Hardware,
    pub cpu: CPU,
}

impl Machine {
    pub fn new(model: CpuModel, ramsize: usize) -> Self {
        let mut machine = Machine {
            hw: Hardware::new(model, ramsize),
            cpu: CPU::new(model),
        };
        machine.cpu.reset();
        machine
    }

    pub fn default() -> Self {
        Self::new(CpuModel::Intel80186, 1 << 20)
    }

    /// places a firmware image so that it ends at the top of the 1 MiB
    /// window, then resets the CPU to the reset vector. the last 16 bytes of
    /// the image cover CS:IP = F000:FFF0.
    pub fn load_firmware(&mut self, data: &[u8]) {
        let base = FIRMWARE_TOP - data.len() as u32;
        for (i, b) in data.iter().enumerate() {
            self.hw.mmu.memory.write_u8(base + i as u32, *b);
        }
        self.cpu.reset();
    }

    pub fn load_firmware_file(&mut self, path: &str) -> SimpleResult<()> {
        let data = try_with!(tools::read_binary(path), "could not read firmware image {}", path);
        self.load_firmware(&data);
        Ok(())
    }

    /// writes a code fragment at seg:offset and points the CPU at it with a
    /// usable stack. used by tests and small harnesses.
    pub fn load_code(&mut self, seg: u16, offset: u16, data: &[u8]) {
        self.hw.mmu.write(seg, offset, data);
        self.cpu.set_sr(SR::CS, seg);
        self.cpu.set_sr(SR::DS, seg);
        self.cpu.set_sr(SR::ES, seg);
        self.cpu.set_sr(SR::SS, seg);
        self.cpu.set_r16(R16::SP, 0xFFFE);
        self.cpu.regs.ip = offset;
    }

    /// retires exactly one instruction
    pub fn execute_instruction(&mut self) -> Result<Step, Fault> {
        self.cpu.execute_instruction(&mut self.hw)
    }

    /// executes n instructions. only used in tests
    pub fn execute_instructions(&mut self, count: usize) -> Result<(), Fault> {
        for _ in 0..count {
            self.execute_instruction()?;
        }
        Ok(())
    }

    /// steps the CPU until HLT retires. a fault ends emulation with the error.
    pub fn run(&mut self) -> Result<(), Fault> {
        loop {
            if let Step::Halt = self.execute_instruction()? {
                return Ok(());
            }
        }
    }
}
