//! Fixed subroutine library appended after the program body.
//!
//! Register convention shared with the code generator:
//! - `r25:r24` left operand and result, `r23:r22` right operand
//! - `r18 r19 r26 r27 r30 r31` scratch, `r16 r17` serial output
//! - `r21:r20` loop counter, `r1` always zero
//! - `r3:r2` hold the base across `pow16`'s calls to `mult16`
//!
//! The half-precision routines (`fadd16`, `fsub16`, `fmul16`, `fdiv16`,
//! `fpow16`, `itof16`, `print_f16`) follow the same convention but live in a
//! separately linked float library.

/// Baud rate divisor for 9600 baud at 16 MHz.
pub const UBRR_9600_16MHZ: u16 = 103;

/// Unsigned 16-bit division: r25:r24 / r23:r22.
/// Quotient in r25:r24, remainder in r27:r26. Clobbers r18.
const UDIVMOD16: &str = "\
udivmod16:
    sub r26, r26
    sub r27, r27
    ldi r18, 17
    rjmp udivmod16_ep
udivmod16_loop:
    adc r26, r26
    adc r27, r27
    cp r26, r22
    cpc r27, r23
    brcs udivmod16_ep
    sub r26, r22
    sbc r27, r23
udivmod16_ep:
    adc r24, r24
    adc r25, r25
    dec r18
    brne udivmod16_loop
    com r24
    com r25
    ret
";

/// Low 16 bits of r25:r24 * r23:r22 into r25:r24 (shift and add).
const MULT16: &str = "\
mult16:
    clr r26
    clr r27
    ldi r18, 16
mult16_loop:
    sbrs r22, 0
    rjmp mult16_skip
    add r26, r24
    adc r27, r25
mult16_skip:
    lsl r24
    rol r25
    lsr r23
    ror r22
    dec r18
    brne mult16_loop
    movw r24, r26
    ret
";

/// Signed truncating division r25:r24 / r23:r22 into r25:r24.
const DIV16: &str = "\
div16:
    mov r19, r25
    eor r19, r23
    rcall abs_operands16
    rcall udivmod16
    sbrs r19, 7
    ret
    com r25
    neg r24
    sbci r25, 0xFF
    ret
";

/// Signed remainder r25:r24 % r23:r22 into r25:r24; sign follows the dividend.
const MOD16: &str = "\
mod16:
    mov r19, r25
    rcall abs_operands16
    rcall udivmod16
    movw r24, r26
    sbrs r19, 7
    ret
    com r25
    neg r24
    sbci r25, 0xFF
    ret
";

/// Replace both operands by their absolute values.
const ABS_OPERANDS16: &str = "\
abs_operands16:
    sbrs r25, 7
    rjmp abs_operands16_rhs
    com r25
    neg r24
    sbci r25, 0xFF
abs_operands16_rhs:
    sbrs r23, 7
    ret
    com r23
    neg r22
    sbci r23, 0xFF
    ret
";

/// Integer power r25:r24 ^ r23:r22 into r25:r24; negative exponents give 0.
const POW16: &str = "\
pow16:
    movw r2, r24
    movw r30, r22
    ldi r24, 1
    clr r25
    sbrs r31, 7
    rjmp pow16_loop
    clr r24
    ret
pow16_loop:
    mov r18, r30
    or r18, r31
    breq pow16_done
    movw r22, r2
    rcall mult16
    sbiw r30, 1
    rjmp pow16_loop
pow16_done:
    ret
";

const UART_PUTC: &str = "\
uart_putc:
    lds r17, UCSR0A
    sbrs r17, UDRE0
    rjmp uart_putc
    sts UDR0, r16
    ret
";

const UART_PUTC_STUB: &str = "\
uart_putc:
    ret
";

/// Signed decimal of r25:r24 over the serial port.
const PRINT_INT16: &str = "\
print_int16:
    sbrs r25, 7
    rjmp print_int16_abs
    push r24
    push r25
    ldi r16, 45
    rcall uart_putc
    pop r25
    pop r24
    com r25
    neg r24
    sbci r25, 0xFF
print_int16_abs:
    clr r19
print_int16_div:
    ldi r22, 10
    clr r23
    rcall udivmod16
    push r26
    inc r19
    mov r18, r24
    or r18, r25
    brne print_int16_div
print_int16_emit:
    pop r16
    subi r16, -48
    rcall uart_putc
    dec r19
    brne print_int16_emit
    ret
";

const PRINT_NEWLINE: &str = "\
print_newline:
    ldi r16, 13
    rcall uart_putc
    ldi r16, 10
    rcall uart_putc
    ret
";

/// Append r25:r24 with type tag r18 to the result ring.
const RES_RECORD: &str = "\
res_record:
    lds r19, result_head
    mov r30, r19
    lsl r30
    add r30, r19
    clr r31
    subi r30, lo8(-(result_history))
    sbci r31, hi8(-(result_history))
    st Z+, r24
    st Z+, r25
    st Z, r18
    inc r19
    andi r19, 7
    sts result_head, r19
    ret
";

/// Load the entry recorded r24 results ago into r25:r24 and its tag into r18.
const RES_FETCH: &str = "\
res_fetch:
    lds r19, result_head
    sub r19, r24
    andi r19, 7
    mov r30, r19
    lsl r30
    add r30, r19
    clr r31
    subi r30, lo8(-(result_history))
    sbci r31, hi8(-(result_history))
    ld r24, Z+
    ld r25, Z+
    ld r18, Z
    ret
";

const RES_PRINT_MIXED: &str = "\
res_print:
    cpi r18, 1
    brne res_print_int
    jmp print_f16
res_print_int:
    rjmp print_int16
";

const RES_PRINT_INT: &str = "\
res_print:
    rjmp print_int16
";

/// Serial port setup: 9600 baud, 8 data bits, transmitter only.
pub fn uart_init() -> String {
  let mut asm = String::new();
  asm.push_str("uart_init:\n");
  asm.push_str(&format!("    ldi r18, hi8({UBRR_9600_16MHZ})\n"));
  asm.push_str("    sts UBRR0H, r18\n");
  asm.push_str(&format!("    ldi r18, lo8({UBRR_9600_16MHZ})\n"));
  asm.push_str("    sts UBRR0L, r18\n");
  asm.push_str("    ldi r18, (1 << TXEN0)\n");
  asm.push_str("    sts UCSR0B, r18\n");
  asm.push_str("    ldi r18, (1 << UCSZ01) | (1 << UCSZ00)\n");
  asm.push_str("    sts UCSR0C, r18\n");
  asm.push_str("    ret\n");
  asm
}

/// Render the subroutine library.
///
/// `serial` selects a real `uart_putc` over a `ret` stub; `float_results`
/// lets `res_print` dispatch float-tagged entries to `print_f16`.
pub fn library(serial: bool, float_results: bool) -> String {
  let mut asm = String::new();
  asm.push_str("; --- 16-bit integer subroutines ---\n");
  for routine in [UDIVMOD16, MULT16, DIV16, MOD16, ABS_OPERANDS16, POW16] {
    asm.push_str(routine);
  }

  asm.push_str("; --- output ---\n");
  if serial {
    asm.push_str(&uart_init());
    asm.push_str(UART_PUTC);
  } else {
    asm.push_str(UART_PUTC_STUB);
  }
  asm.push_str(PRINT_INT16);
  asm.push_str(PRINT_NEWLINE);

  asm.push_str("; --- result history ---\n");
  asm.push_str(RES_RECORD);
  asm.push_str(RES_FETCH);
  asm.push_str(if float_results {
    RES_PRINT_MIXED
  } else {
    RES_PRINT_INT
  });
  asm
}
